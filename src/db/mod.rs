mod store;

pub use store::{RecordStore, SaleWithAsin, SalesTotals};

#[cfg(test)]
pub(crate) use store::tests::memory_store;
