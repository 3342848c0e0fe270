use serde::{Deserialize, Serialize};
use std::fmt;

/// A single hosts-format DNS record: one address, any number of names
///
/// Equality is exact: same address, same hostnames in the same order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DnsRecord {
    /// Address the hostnames resolve to
    pub address: String,
    /// Hostnames, already normalized by the projector
    pub hostnames: Vec<String>,
}

impl DnsRecord {
    /// Create a new record
    pub fn new<I, S>(address: impl Into<String>, hostnames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            address: address.into(),
            hostnames: hostnames.into_iter().map(Into::into).collect(),
        }
    }
}

/// Renders the zone line for this record, without the trailing newline
impl fmt::Display for DnsRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)?;
        for hostname in &self.hostnames {
            write!(f, "\t{}", hostname)?;
        }
        Ok(())
    }
}
