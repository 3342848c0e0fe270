// # Entry Store
//
// The in-memory mapping from resource identity to DNS record that the
// engine renders into the zone file.
//
// There is no persistence: on restart the store is empty and the initial
// subscription replay repopulates it.

pub mod entry_store;
pub mod record;

pub use entry_store::EntryStore;
pub use record::DnsRecord;
