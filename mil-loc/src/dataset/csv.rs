use super::*;
use crate::common::*;

/// Loads an instance table from a label file.
///
/// The first column holds the image identifier, and each remaining column is
/// a label channel named by its header. A label cell holds `box_size * box_size`
/// whitespace-separated numbers in row-major order. Lines starting with `#`
/// are ignored.
pub fn load_instance_table(label_file: impl AsRef<Path>) -> Result<InstanceTable> {
    let label_file = label_file.as_ref();
    let mut reader = ::csv::ReaderBuilder::new()
        .has_headers(true)
        .comment(Some(b'#'))
        .trim(::csv::Trim::All)
        .from_path(label_file)
        .with_context(|| format!("failed to open label file '{}'", label_file.display()))?;

    let channels: Vec<String> = {
        let headers = reader.headers()?;
        ensure!(
            headers.len() >= 2,
            "the label file '{}' must have an image column and at least one label column",
            label_file.display()
        );
        headers.iter().skip(1).map(ToOwned::to_owned).collect()
    };

    let rows: Vec<(String, Vec<Vec<f32>>)> = reader
        .records()
        .enumerate()
        .map(|(line, row)| -> Result<_> {
            let row = row?;
            let image = row
                .get(0)
                .ok_or_else(|| format_err!("missing image column at row {}", line + 1))?
                .to_owned();
            let grids: Vec<Vec<f32>> = row
                .iter()
                .skip(1)
                .map(parse_grid)
                .try_collect()
                .with_context(|| format!("invalid label cell at row {}", line + 1))?;
            Ok((image, grids))
        })
        .try_collect()?;

    let box_size = match rows.first() {
        Some((_, grids)) => infer_box_size(&grids[0]).context("invalid label cell at row 1")?,
        None => bail!("no records found in '{}'", label_file.display()),
    };
    let mut table = InstanceTable::new(channels, box_size)?;

    for (line, (image, grids)) in rows.into_iter().enumerate() {
        let num_channels = grids.len();
        ensure!(
            grids.iter().all(|grid| grid.len() == box_size * box_size),
            "row {} has label cells of mismatched length, expect {} values per cell",
            line + 1,
            box_size * box_size
        );
        let values: Vec<f32> = grids.into_iter().flatten().collect();
        let labels = Array3::from_shape_vec((num_channels, box_size, box_size), values)?;
        table.push(InstanceRecord::new(image, labels)?)?;
    }

    Ok(table)
}

fn parse_grid(cell: &str) -> Result<Vec<f32>> {
    let values: Vec<f32> = cell
        .split_whitespace()
        .map(|token| {
            token
                .parse::<f32>()
                .with_context(|| format!("'{}' is not a number", token))
        })
        .try_collect()?;
    Ok(values)
}

fn infer_box_size(grid: &[f32]) -> Result<usize> {
    let box_size = (grid.len() as f64).sqrt().round() as usize;
    ensure!(
        box_size > 0 && box_size * box_size == grid.len(),
        "a label cell must hold a square grid, but get {} values",
        grid.len()
    );
    Ok(box_size)
}
