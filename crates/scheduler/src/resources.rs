//! Reservation-aware resource arithmetic over the master's resource model.
//!
//! A [`Resources`] value is an ordered multiset of scalar resources (`cpus` in
//! cores, `mem` and `disk` in MiB), each optionally carrying a stack of static
//! reservations. The operations here mirror the master's semantics closely
//! enough for single-offer matching: addition, scalar subtraction,
//! containment, and carving a requested bundle out of an offered one.

use serde::{Deserialize, Serialize};

pub const RESOURCE_CPUS: &str = "cpus";
pub const RESOURCE_MEM: &str = "mem";
pub const RESOURCE_DISK: &str = "disk";

/// Scalar comparisons tolerate the rounding the master applies to resource
/// math (fixed-point with three decimal digits).
const EPSILON: f64 = 0.0005;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ValueType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scalar: Option<Scalar>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reservations: Vec<ReservationInfo>,
}

impl Resource {
    pub fn scalar_value(&self) -> f64 {
        self.scalar.as_ref().map(|s| s.value).unwrap_or(0.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueType {
    Scalar,
    Ranges,
    Set,
}

impl Default for ValueType {
    fn default() -> Self {
        ValueType::Scalar
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Scalar {
    pub value: f64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationInfo {
    #[serde(rename = "type")]
    pub kind: ReservationType,
    pub role: String,
}

impl ReservationInfo {
    pub fn static_role(role: impl Into<String>) -> Self {
        ReservationInfo {
            kind: ReservationType::Static,
            role: role.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationType {
    Static,
    Dynamic,
}

/// An ordered multiset of typed resources.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Resources(pub Vec<Resource>);

impl Resources {
    pub fn new() -> Self {
        Resources(Vec::new())
    }

    pub fn cpus(value: f64) -> Resource {
        Resources::scalar(RESOURCE_CPUS, value)
    }

    pub fn mem(value: f64) -> Resource {
        Resources::scalar(RESOURCE_MEM, value)
    }

    pub fn disk(value: f64) -> Resource {
        Resources::scalar(RESOURCE_DISK, value)
    }

    pub fn scalar(name: &str, value: f64) -> Resource {
        Resource {
            name: name.to_string(),
            kind: ValueType::Scalar,
            scalar: Some(Scalar { value }),
            reservations: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.0.iter()
    }

    /// Total scalar quantity of the named resource across all entries.
    pub fn sum_scalar(&self, name: &str) -> f64 {
        self.0
            .iter()
            .filter(|r| r.name == name && r.kind == ValueType::Scalar)
            .map(Resource::scalar_value)
            .sum()
    }

    /// Names of all scalar resources present, deduplicated, in first-seen
    /// order.
    pub fn scalar_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for r in &self.0 {
            if r.kind == ValueType::Scalar && !names.iter().any(|n| n == &r.name) {
                names.push(r.name.clone());
            }
        }
        names
    }

    /// Elementwise sum, merging entries that share a name and reservation
    /// stack.
    pub fn plus(&self, other: &Resources) -> Resources {
        let mut result = self.clone();
        for r in &other.0 {
            match result
                .0
                .iter_mut()
                .find(|have| have.name == r.name && have.reservations == r.reservations)
            {
                Some(have) => {
                    let merged = have.scalar_value() + r.scalar_value();
                    have.scalar = Some(Scalar { value: merged });
                }
                None => result.0.push(r.clone()),
            }
        }
        result
    }

    /// Scalar subtraction by resource name, draining entries in order.
    /// Entries reduced to (near) zero are dropped.
    pub fn subtract(&mut self, other: &Resources) {
        for want in &other.0 {
            let mut remaining = want.scalar_value();
            for have in self.0.iter_mut().filter(|r| r.name == want.name) {
                if remaining <= EPSILON {
                    break;
                }
                let available = have.scalar_value();
                let taken = available.min(remaining);
                have.scalar = Some(Scalar {
                    value: available - taken,
                });
                remaining -= taken;
            }
        }
        self.0.retain(|r| r.scalar_value() > EPSILON);
    }

    /// Whether every scalar quantity in `needed` is covered by this bundle.
    pub fn contains_all(&self, needed: &Resources) -> bool {
        needed
            .scalar_names()
            .iter()
            .all(|name| self.sum_scalar(name) + EPSILON >= needed.sum_scalar(name))
    }

    /// Carves a sub-bundle satisfying `wanted` out of this bundle. The carved
    /// resources keep `wanted`'s reservation stacks so they can be launched
    /// under the requested role. Returns an empty bundle when any quantity
    /// cannot be satisfied.
    pub fn find(&self, wanted: &Resources) -> Resources {
        for r in &wanted.0 {
            if self.sum_scalar(&r.name) + EPSILON < r.scalar_value() {
                return Resources::new();
            }
        }
        Resources(wanted.0.clone())
    }

    /// Returns a copy of this bundle with a static reservation for `role`
    /// pushed onto every entry.
    pub fn push_reservation(&self, reservation: ReservationInfo) -> Resources {
        let mut result = self.clone();
        for r in &mut result.0 {
            r.reservations.push(reservation.clone());
        }
        result
    }

    /// Returns a copy with all reservation info stripped, so quantities can
    /// be compared regardless of role.
    pub fn to_unreserved(&self) -> Resources {
        let mut result = self.clone();
        for r in &mut result.0 {
            r.reservations.clear();
        }
        result
    }
}

impl From<Vec<Resource>> for Resources {
    fn from(resources: Vec<Resource>) -> Self {
        Resources(resources)
    }
}

impl std::fmt::Display for Resources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for r in &self.0 {
            if !first {
                f.write_str("; ")?;
            }
            first = false;
            write!(f, "{}:{}", r.name, r.scalar_value())?;
            for reservation in &r.reservations {
                write!(f, "(role {})", reservation.role)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn bundle(cpus: f64, mem: f64, disk: f64) -> Resources {
        Resources(vec![
            Resources::cpus(cpus),
            Resources::mem(mem),
            Resources::disk(disk),
        ])
    }

    #[test]
    fn plus_merges_matching_entries() {
        let sum = bundle(0.5, 64.0, 128.0).plus(&bundle(1.5, 64.0, 0.0));
        assert_eq!(sum.sum_scalar(RESOURCE_CPUS), 2.0);
        assert_eq!(sum.sum_scalar(RESOURCE_MEM), 128.0);
        assert_eq!(sum.0.len(), 3);
    }

    #[test]
    fn plus_keeps_reserved_entries_separate() {
        let reserved =
            bundle(1.0, 0.0, 0.0).push_reservation(ReservationInfo::static_role("batch"));
        let sum = bundle(1.0, 0.0, 0.0).plus(&reserved);
        assert_eq!(sum.0.len(), 4);
        assert_eq!(sum.sum_scalar(RESOURCE_CPUS), 2.0);
    }

    #[test]
    fn subtract_drains_in_order_and_drops_empty() {
        let mut offered = bundle(2.0, 1024.0, 1024.0);
        offered.subtract(&bundle(0.5, 1024.0, 256.0));
        assert!((offered.sum_scalar(RESOURCE_CPUS) - 1.5).abs() < 0.001);
        assert_eq!(offered.sum_scalar(RESOURCE_MEM), 0.0);
        assert_eq!(offered.sum_scalar(RESOURCE_DISK), 768.0);
        assert!(!offered.0.iter().any(|r| r.name == RESOURCE_MEM));
    }

    #[test]
    fn contains_all_checks_every_name() {
        let offered = bundle(2.0, 1024.0, 1024.0);
        assert!(offered.contains_all(&bundle(2.0, 1024.0, 1024.0)));
        assert!(offered.contains_all(&bundle(0.1, 32.0, 256.0)));
        assert!(!offered.contains_all(&bundle(2.1, 32.0, 256.0)));
        assert!(!offered.contains_all(&bundle(0.1, 2048.0, 256.0)));
    }

    #[test]
    fn find_carves_the_wanted_quantities() {
        let offered = bundle(2.0, 1024.0, 1024.0);
        let wanted = bundle(1.0, 128.0, 128.0);
        let found = offered.find(&wanted);
        assert_eq!(found.sum_scalar(RESOURCE_CPUS), 1.0);
        assert_eq!(found.sum_scalar(RESOURCE_MEM), 128.0);
    }

    #[test]
    fn find_returns_empty_when_short() {
        let offered = bundle(0.1, 16.0, 16.0);
        assert!(offered.find(&bundle(0.1, 32.0, 256.0)).is_empty());
    }

    #[test]
    fn find_keeps_requested_reservation() {
        let offered = bundle(2.0, 1024.0, 1024.0);
        let wanted =
            bundle(1.0, 128.0, 128.0).push_reservation(ReservationInfo::static_role("batch"));
        let found = offered.find(&wanted);
        assert!(found
            .iter()
            .all(|r| r.reservations == vec![ReservationInfo::static_role("batch")]));
    }

    #[test]
    fn to_unreserved_strips_reservations() {
        let reserved = bundle(1.0, 32.0, 64.0).push_reservation(ReservationInfo::static_role("x"));
        let flattened = reserved.to_unreserved();
        assert!(flattened.iter().all(|r| r.reservations.is_empty()));
        assert_eq!(flattened.sum_scalar(RESOURCE_CPUS), 1.0);
    }

    #[test]
    fn carve_never_overcommits() {
        let original = bundle(2.0, 1024.0, 1024.0);
        let mut remaining = original.clone();
        let executor = remaining.find(&bundle(0.1, 32.0, 256.0));
        remaining.subtract(&executor);
        let task = remaining.find(&bundle(1.0, 128.0, 128.0));
        remaining.subtract(&task);

        let carved = executor.plus(&task);
        for name in [RESOURCE_CPUS, RESOURCE_MEM, RESOURCE_DISK] {
            assert!(carved.sum_scalar(name) <= original.sum_scalar(name) + 0.001);
            assert!(
                (carved.sum_scalar(name) + remaining.sum_scalar(name)
                    - original.sum_scalar(name))
                .abs()
                    < 0.001
            );
        }
    }

    #[test]
    fn offer_resources_deserialize() {
        let resources: Resources = serde_json::from_str(
            r#"[{"name":"cpus","type":"SCALAR","scalar":{"value":2.0}},
                {"name":"mem","type":"SCALAR","scalar":{"value":1024.0},
                 "reservations":[{"type":"STATIC","role":"batch"}]}]"#,
        )
        .unwrap();
        assert_eq!(resources.sum_scalar(RESOURCE_CPUS), 2.0);
        assert_eq!(resources.0[1].reservations[0].role, "batch");
    }
}
