use serde::{Deserialize, Serialize};

use crate::types::{Sample, ZoneId};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Zone {
    pub id: ZoneId,
    pub name: String,
    pub fingerprint: Option<Sample>,
}

/// Fixed zone table, built once at startup from the configured labels.
/// Zones are only ever trained (fingerprint replaced wholesale) or
/// cleared back to untrained, never added or removed at runtime.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ZoneRegistry {
    zones: Vec<Zone>,
}

impl ZoneRegistry {
    pub fn new(labels: Vec<String>) -> Self {
        let zones = labels
            .into_iter()
            .enumerate()
            .map(|(id, name)| Zone {
                id,
                name,
                fingerprint: None,
            })
            .collect();
        ZoneRegistry { zones }
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn contains(&self, id: ZoneId) -> bool {
        id < self.zones.len()
    }

    pub fn get(&self, id: ZoneId) -> Option<&Zone> {
        self.zones.get(id)
    }

    /// Replace the stored fingerprint. Unknown ids are ignored.
    pub fn set_fingerprint(&mut self, id: ZoneId, fingerprint: Sample) {
        if let Some(zone) = self.zones.get_mut(id) {
            zone.fingerprint = Some(fingerprint);
        }
    }

    /// Drop a zone's fingerprint. Returns whether anything was removed,
    /// so callers can tell a real clear from a no-op on an untrained zone.
    pub fn clear(&mut self, id: ZoneId) -> bool {
        match self.zones.get_mut(id) {
            Some(zone) => zone.fingerprint.take().is_some(),
            None => false,
        }
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    /// Trained zones with their fingerprints, in ascending id order.
    pub fn trained(&self) -> impl Iterator<Item = (&Zone, &Sample)> {
        self.zones
            .iter()
            .filter_map(|z| z.fingerprint.as_ref().map(|fp| (z, fp)))
    }

    pub fn trained_count(&self) -> usize {
        self.zones.iter().filter(|z| z.fingerprint.is_some()).count()
    }
}
