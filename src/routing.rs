//! Routing triples to decoded records

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::trace;

use crate::layout::{DecodedRecord, LayoutRegistry};
use crate::projection::FieldProjection;
use crate::types::{Packet, RecordKey, Route};
use crate::Result;

/// Matches inbound routes; `cmd_set: None` accepts any command set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoutePattern {
    pub src: u8,
    #[serde(default)]
    pub cmd_set: Option<u8>,
    pub cmd_id: u8,
}

impl RoutePattern {
    pub const fn new(src: u8, cmd_set: u8, cmd_id: u8) -> Self {
        Self { src, cmd_set: Some(cmd_set), cmd_id }
    }

    pub const fn any_cmd_set(src: u8, cmd_id: u8) -> Self {
        Self { src, cmd_set: None, cmd_id }
    }

    pub fn matches(&self, route: &Route) -> bool {
        self.src == route.src
            && self.cmd_id == route.cmd_id
            && self.cmd_set.is_none_or(|cmd_set| cmd_set == route.cmd_set)
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cmd_set {
            Some(cmd_set) => write!(f, "({:#04x}, {:#04x}, {:#04x})", self.src, cmd_set, self.cmd_id),
            None => write!(f, "({:#04x}, *, {:#04x})", self.src, self.cmd_id),
        }
    }
}

/// Ordered route patterns; the first match wins.
#[derive(Debug, Clone)]
pub struct RouteTable<T> {
    entries: Vec<(RoutePattern, T)>,
}

impl<T> Default for RouteTable<T> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<T> RouteTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, pattern: RoutePattern, target: T) -> &mut Self {
        self.entries.push((pattern, target));
        self
    }

    pub fn find(&self, route: &Route) -> Option<&T> {
        self.entries.iter().find(|(pattern, _)| pattern.matches(route)).map(|(_, target)| target)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(RoutePattern, T)> + '_ {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Routes packets to registered records and feeds them to a projection.
#[derive(Debug, Clone, Default)]
pub struct RecordRouter {
    registry: LayoutRegistry,
    routes: RouteTable<RecordKey>,
}

impl RecordRouter {
    pub fn new(registry: LayoutRegistry) -> Self {
        Self { registry, routes: RouteTable::new() }
    }

    /// Route matching packets to `record`, which must already be registered.
    pub fn route(&mut self, pattern: RoutePattern, record: impl Into<RecordKey>) -> Result<&mut Self> {
        let record = record.into();
        self.registry.lookup(record.as_str())?;
        self.routes.add(pattern, record);
        Ok(self)
    }

    pub fn registry(&self) -> &LayoutRegistry {
        &self.registry
    }

    pub fn routes(&self) -> &RouteTable<RecordKey> {
        &self.routes
    }

    /// The record key a packet routes to, if any.
    pub fn record_for(&self, packet: &Packet) -> Option<&RecordKey> {
        self.routes.find(&packet.route())
    }

    /// Decode the packet's payload and apply it to `projection`.
    ///
    /// Returns `None` when no route matches.
    pub fn apply(
        &self,
        projection: &mut FieldProjection,
        packet: &Packet,
    ) -> Result<Option<(RecordKey, DecodedRecord)>> {
        let Some(record) = self.record_for(packet) else {
            trace!(route = %packet.route(), "Unrouted packet");
            return Ok(None);
        };
        let decoded = self.registry.decode(record.as_str(), &packet.payload)?;
        projection.update_from_record(record.as_str(), &decoded);
        Ok(Some((record.clone(), decoded)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::FieldLayout;
    use crate::types::FieldType;

    fn router() -> RecordRouter {
        let mut registry = LayoutRegistry::new();
        registry.register(
            "inv",
            FieldLayout::builder("inv").field("output_watts", FieldType::UInt16).build().unwrap(),
        );
        let mut router = RecordRouter::new(registry);
        router.route(RoutePattern::any_cmd_set(0x04, 0x02), "inv").unwrap();
        router
    }

    #[test]
    fn wildcard_cmd_set_matches_any() {
        let pattern = RoutePattern::any_cmd_set(0x04, 0x02);
        assert!(pattern.matches(&Route::new(0x04, 0x20, 0x02)));
        assert!(pattern.matches(&Route::new(0x04, 0x03, 0x02)));
        assert!(!pattern.matches(&Route::new(0x04, 0x20, 0x03)));
        assert_eq!(pattern.to_string(), "(0x04, *, 0x02)");
    }

    #[test]
    fn first_matching_route_wins() {
        let mut table = RouteTable::new();
        table.add(RoutePattern::new(0x03, 0x20, 0x32), "exact");
        table.add(RoutePattern::any_cmd_set(0x03, 0x32), "fallback");
        assert_eq!(table.find(&Route::new(0x03, 0x20, 0x32)), Some(&"exact"));
        assert_eq!(table.find(&Route::new(0x03, 0x21, 0x32)), Some(&"fallback"));
        assert_eq!(table.find(&Route::new(0x06, 0x20, 0x32)), None);
    }

    #[test]
    fn router_applies_routed_payloads() {
        let router = router();
        let mut projection = FieldProjection::new();
        projection.register_mapping("ac_output_power", "inv", "output_watts", None);

        let packet = Packet::new(0x04, 0x21, 0x11, 0x02, 500u16.to_le_bytes().to_vec(), 2);
        let (record, decoded) = router.apply(&mut projection, &packet).unwrap().unwrap();
        assert_eq!(record.as_str(), "inv");
        assert_eq!(decoded.get_as::<u16>("output_watts"), Some(500));
        assert_eq!(projection.get_as::<u16>("ac_output_power"), Some(500));

        let unrouted = Packet::new(0x09, 0x21, 0x20, 0x02, vec![], 2);
        assert!(router.apply(&mut projection, &unrouted).unwrap().is_none());
    }

    #[test]
    fn routes_must_name_registered_records() {
        let mut router = router();
        assert!(router.route(RoutePattern::new(0x02, 0x20, 0x02), "pd").is_err());
    }
}
