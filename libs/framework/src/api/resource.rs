//! Resource quantities.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A bundle of resource quantities in integer base units.
///
/// CPU is counted in millicores and memory in bytes. Anything else (GPUs,
/// hugepages, vendor devices) lives in `scalars` keyed by resource name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub milli_cpu: u64,
    pub memory: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub scalars: BTreeMap<String, u64>,
}

impl Resource {
    pub fn new(milli_cpu: u64, memory: u64) -> Self {
        Self {
            milli_cpu,
            memory,
            scalars: BTreeMap::new(),
        }
    }

    /// Adds a named scalar quantity.
    #[must_use]
    pub fn with_scalar(mut self, name: impl Into<String>, quantity: u64) -> Self {
        *self.scalars.entry(name.into()).or_insert(0) += quantity;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.milli_cpu == 0 && self.memory == 0 && self.scalars.values().all(|q| *q == 0)
    }

    pub fn add(&mut self, rhs: &Resource) {
        self.milli_cpu += rhs.milli_cpu;
        self.memory += rhs.memory;
        for (name, quantity) in &rhs.scalars {
            *self.scalars.entry(name.clone()).or_insert(0) += quantity;
        }
    }

    /// Subtracts `rhs`, or returns `None` (leaving `self` unchanged) if any
    /// dimension would go negative.
    pub fn checked_sub(&self, rhs: &Resource) -> Option<Resource> {
        let mut out = Resource::new(
            self.milli_cpu.checked_sub(rhs.milli_cpu)?,
            self.memory.checked_sub(rhs.memory)?,
        );
        out.scalars = self.scalars.clone();
        for (name, quantity) in &rhs.scalars {
            if *quantity == 0 {
                continue;
            }
            let have = out.scalars.get_mut(name)?;
            *have = have.checked_sub(*quantity)?;
        }
        Some(out)
    }

    /// True when every dimension of `self` fits inside `rhs`.
    pub fn less_equal(&self, rhs: &Resource) -> bool {
        rhs.checked_sub(self).is_some()
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cpu {}m, memory {}", self.milli_cpu, self.memory)?;
        for (name, quantity) in &self.scalars {
            write!(f, ", {} {}", name, quantity)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_sub_underflow_is_none() {
        let small = Resource::new(500, 1024);
        let big = Resource::new(1000, 512);
        assert!(small.checked_sub(&big).is_none());
        assert_eq!(big.checked_sub(&Resource::new(1000, 512)), Some(Resource::default()));
    }

    #[test]
    fn test_scalar_missing_on_lhs() {
        let node = Resource::new(4000, 4096);
        let gpu_task = Resource::new(100, 1).with_scalar("nvidia.com/gpu", 1);
        assert!(!gpu_task.less_equal(&node));
        assert!(gpu_task.less_equal(&node.clone().with_scalar("nvidia.com/gpu", 2)));
    }

    #[test]
    fn test_add_then_sub() {
        let mut total = Resource::new(1000, 2048).with_scalar("gpu", 1);
        let extra = Resource::new(250, 512).with_scalar("gpu", 1);
        total.add(&extra);
        assert_eq!(total.scalars["gpu"], 2);
        let back = total.checked_sub(&extra).unwrap();
        assert_eq!(back, Resource::new(1000, 2048).with_scalar("gpu", 1));
    }

    #[test]
    fn test_is_empty_ignores_zero_scalars() {
        assert!(Resource::default().with_scalar("gpu", 0).is_empty());
        assert!(!Resource::new(1, 0).is_empty());
    }
}
