/// Where a single transmission unit belongs within the original tensor list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkEntry {
    /// The index of the tensor the unit was extracted from.
    pub tensor: usize,
    /// Indices along the leading axes that lead to the unit's one-dimensional slice.
    pub position: Vec<usize>,
    /// The amount of values in the unit.
    pub len: usize,
}

/// Ordered metadata with one entry per transmission unit, plus the shape of every tensor.
///
/// Replaying the entries against zeroed tensors of the recorded shapes restores the original
/// nesting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkMap {
    entries: Vec<ChunkEntry>,
    shapes: Vec<Vec<usize>>,
}

impl ChunkMap {
    pub(super) fn push_shape(&mut self, shape: &[usize]) {
        self.shapes.push(shape.to_vec());
    }

    pub(super) fn push_entry(&mut self, entry: ChunkEntry) {
        self.entries.push(entry);
    }

    /// The amount of transmission units.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ChunkEntry] {
        &self.entries
    }

    pub fn get(&self, unit: usize) -> Option<&ChunkEntry> {
        self.entries.get(unit)
    }

    /// The shapes of the tensors, in list order.
    pub fn shapes(&self) -> &[Vec<usize>] {
        &self.shapes
    }
}
