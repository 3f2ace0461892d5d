//! String-keyed blackboard through which metrics hand derived values to later metrics.
//!
//! The evaluation driver passes one `OutputParams` into every `consume` call, running
//! writers before readers for each sample. Readers treat a missing or non-finite entry
//! as "no data yet".

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

pub const NEEDLE_PLANE_DISTANCE_MM: &str = "PerkTutor_NeedlePlaneDistanceMm";
pub const NEEDLE_PLANE_ANGLE_DEG: &str = "PerkTutor_NeedlePlaneAngleDeg";
pub const IN_ACTION: &str = "PerkTutor_InAction";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputParams {
    values: HashMap<String, Option<f64>>,
}

impl OutputParams {
    pub fn set(&mut self, key: &str, value: f64) {
        self.values.insert(key.to_string(), Some(value));
    }

    pub fn set_flag(&mut self, key: &str, flag: bool) {
        self.set(key, if flag { 1.0 } else { 0.0 });
    }

    /// Keeps the key but marks it as carrying no value.
    pub fn unset(&mut self, key: &str) {
        self.values.insert(key.to_string(), None);
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.values
            .get(key)
            .copied()
            .flatten()
            .filter(|value| value.is_finite())
    }

    pub fn flag(&self, key: &str) -> bool {
        self.get(key).is_some_and(|value| value != 0.0)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}
