use std::fmt;

use crate::error::{Error, Result};

// Engine — Capability token for a compute device
//
// Descriptors and tensors are bound to an Engine; primitives refuse to mix
// operands from different engines. The engine carries no state of its own:
// it only names a device kind and index, so it is Copy and compared by value.

/// Kind of compute device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    Cpu,
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineKind::Cpu => write!(f, "cpu"),
        }
    }
}

/// Identifies a compute device (e.g. "cpu:0").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Engine {
    kind: EngineKind,
    index: usize,
}

impl Engine {
    /// Bind to device `index` of `kind`.
    pub fn new(kind: EngineKind, index: usize) -> Result<Self> {
        let engine = Engine { kind, index };
        let available = Self::count(kind);
        if index >= available {
            return Err(Error::EngineUnavailable { engine, available });
        }
        Ok(engine)
    }

    /// The host CPU engine.
    pub fn cpu() -> Self {
        Engine {
            kind: EngineKind::Cpu,
            index: 0,
        }
    }

    /// How many devices of `kind` exist.
    pub fn count(kind: EngineKind) -> usize {
        match kind {
            EngineKind::Cpu => 1,
        }
    }

    pub fn kind(&self) -> EngineKind {
        self.kind
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// A human-readable name for this engine (e.g., "cpu:0").
    pub fn name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_engine() {
        let e = Engine::new(EngineKind::Cpu, 0).unwrap();
        assert_eq!(e, Engine::cpu());
        assert_eq!(e.name(), "cpu:0");
    }

    #[test]
    fn test_missing_index() {
        assert!(matches!(
            Engine::new(EngineKind::Cpu, 1),
            Err(Error::EngineUnavailable { available: 1, .. })
        ));
    }
}
