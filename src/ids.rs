//! Strongly-typed identifiers for tenants and routers.
//!
//! `nutype`-wrapped `Uuid` newtypes, so a stray `Uuid` can never be passed
//! where a `TenantId` or `RouterId` is expected.

use nutype::nutype;
use uuid::Uuid;

/// Identifies a tenant: an isolation boundary that groups routers.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    From,
    Into
))]
pub struct TenantId(Uuid);

impl TenantId {
    /// Generates a new random tenant id. Used only by tests and fixtures;
    /// real tenant ids always come from upstream events.
    #[must_use]
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4())
    }

    /// Parses a tenant id from a hyphenated or bare-hex UUID string,
    /// normalizing either form to canonical dashed form, so that raw hex
    /// targets from the transport and hyphenated ids both resolve to the
    /// same tenant.
    pub fn normalize(target: &str) -> Result<Self, uuid::Error> {
        let stripped: String = target.chars().filter(|c| *c != '-').collect();
        Uuid::parse_str(&stripped).map(Self::new)
    }
}

/// Identifies a tenant's virtual router.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    From,
    Into
))]
pub struct RouterId(Uuid);

impl RouterId {
    /// Generates a new random router id. Used only by tests and fixtures.
    #[must_use]
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4())
    }

    /// Parses a router id from a hyphenated or bare-hex UUID string. Same
    /// dash-stripping normalization as [`TenantId::normalize`] — the
    /// original `_normalize_uuid` helper was shared by both id kinds.
    pub fn normalize(target: &str) -> Result<Self, uuid::Error> {
        let stripped: String = target.chars().filter(|c| *c != '-').collect();
        Uuid::parse_str(&stripped).map(Self::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_dashes_before_reparsing() {
        let id = TenantId::generate();
        let bare = id.to_string().replace('-', "");
        assert_eq!(TenantId::normalize(&bare).unwrap(), id);
    }

    #[test]
    fn normalize_rejects_garbage() {
        assert!(TenantId::normalize("not-a-uuid").is_err());
    }

    #[test]
    fn router_id_normalize_strips_dashes_before_reparsing() {
        let id = RouterId::generate();
        let bare = id.to_string().replace('-', "");
        assert_eq!(RouterId::normalize(&bare).unwrap(), id);
    }
}
