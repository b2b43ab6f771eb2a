use super::*;
use crate::common::*;

/// An ordered collection of records sharing the same label layout.
///
/// Image identifiers are not required to be unique.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceTable {
    channels: IndexSet<String>,
    box_size: usize,
    records: Vec<InstanceRecord>,
}

impl InstanceTable {
    /// Creates an empty table with the given channel names and grid size.
    pub fn new<I, S>(channels: I, box_size: usize) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = channels.into_iter().map(Into::into).collect();
        let channels: IndexSet<_> = names.iter().cloned().collect();
        ensure!(
            channels.len() == names.len(),
            "duplicated channel names in {:?}",
            names
        );
        ensure!(!channels.is_empty(), "a table must have at least one channel");
        ensure!(box_size > 0, "box_size must be positive");

        Ok(Self {
            channels,
            box_size,
            records: vec![],
        })
    }

    pub fn from_records<I, S>(
        channels: I,
        box_size: usize,
        records: impl IntoIterator<Item = InstanceRecord>,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut table = Self::new(channels, box_size)?;
        records
            .into_iter()
            .try_for_each(|record| table.push(record))?;
        Ok(table)
    }

    /// Appends a record. The record must match the table's label layout.
    pub fn push(&mut self, record: InstanceRecord) -> Result<()> {
        let expect = (self.num_channels(), self.box_size, self.box_size);
        ensure!(
            record.labels.dim() == expect,
            "record '{}' has label shape {:?}, but the table expects {:?}",
            record.image,
            record.labels.dim(),
            expect
        );
        self.records.push(record);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn channels(&self) -> &IndexSet<String> {
        &self.channels
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn box_size(&self) -> usize {
        self.box_size
    }

    pub fn records(&self) -> &[InstanceRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<InstanceRecord> {
        self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &InstanceRecord> {
        self.records.iter()
    }

    /// Builds a new table from the records at `indices`, in the given order.
    pub fn select(&self, indices: &[usize]) -> Result<Self> {
        let records: Vec<_> = indices
            .iter()
            .map(|&index| {
                self.records
                    .get(index)
                    .cloned()
                    .ok_or_else(|| format_err!("invalid record index {}", index))
            })
            .try_collect()?;

        Ok(Self {
            channels: self.channels.clone(),
            box_size: self.box_size,
            records,
        })
    }

    /// Keeps only the named channels, in the given order.
    pub fn select_channels<S>(&self, names: &[S]) -> Result<Self>
    where
        S: AsRef<str>,
    {
        let indices: Vec<usize> = names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                self.channels
                    .get_index_of(name)
                    .ok_or_else(|| format_err!("the channel '{}' does not exist", name))
            })
            .try_collect()?;
        let channels: IndexSet<String> = names.iter().map(|name| name.as_ref().to_owned()).collect();
        ensure!(
            channels.len() == names.len(),
            "duplicated channel names in the selection"
        );

        let records = self
            .records
            .iter()
            .map(|record| InstanceRecord {
                image: record.image.clone(),
                labels: record.labels.select(Axis(0), &indices),
            })
            .collect();

        Ok(Self {
            channels,
            box_size: self.box_size,
            records,
        })
    }

    /// Keeps the rows whose named channel has at least one positive cell.
    pub fn filter_on_channel(&self, name: &str) -> Result<Self> {
        let channel = self
            .channels
            .get_index_of(name)
            .ok_or_else(|| format_err!("the channel '{}' does not exist", name))?;
        let records = self
            .records
            .iter()
            .filter(|record| record.has_positive(channel))
            .cloned()
            .collect();

        Ok(Self {
            channels: self.channels.clone(),
            box_size: self.box_size,
            records,
        })
    }
}
