use crate::core::registry::DeviceRegistry;
use crate::domain::model::{Filter, PortDescriptor};

/// Accessible ports matching at least one filter; no filters means all of them.
pub fn resolve(registry: &DeviceRegistry, filters: &[Filter]) -> Vec<PortDescriptor> {
    select(&registry.list_accessible(), filters)
}

/// Filter matching over an arbitrary candidate list, preserving its order.
pub fn select(candidates: &[PortDescriptor], filters: &[Filter]) -> Vec<PortDescriptor> {
    candidates
        .iter()
        .filter(|port| filters.is_empty() || filters.iter().any(|f| f.matches(&port.info)))
        .cloned()
        .collect()
}
