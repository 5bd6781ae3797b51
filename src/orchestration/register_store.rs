use crate::config::{RegisterName, ToolName};
use crate::orchestration::error::OrchestratorError;
use crate::shared::serde_ext::canonical_json_bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Register {
    pub name: RegisterName,
    pub value: Value,
    pub produced_by: ToolName,
    pub written_at: u64,
    pub digest: String,
}

impl Register {
    pub fn verify_digest(&self) -> bool {
        value_digest(&self.value) == self.digest
    }
}

/// Session-scoped intermediate values. Only the dispatcher writes here, and
/// only from a tool's declared outputs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterStore {
    registers: BTreeMap<RegisterName, Register>,
    sequence: u64,
}

impl RegisterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, name: RegisterName, value: Value, producer: ToolName) -> &Register {
        self.sequence = self.sequence.saturating_add(1);
        let register = Register {
            digest: value_digest(&value),
            name: name.clone(),
            value,
            produced_by: producer,
            written_at: self.sequence,
        };
        self.registers.insert(name.clone(), register);
        &self.registers[&name]
    }

    pub fn get(&self, name: &str) -> Result<&Register, OrchestratorError> {
        self.registers
            .get(name)
            .ok_or_else(|| OrchestratorError::RegisterNotSet {
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.registers.contains_key(name)
    }

    /// Fails with every absent name, in request order, so the caller sees the
    /// complete gap in one error.
    pub fn require_all<'a, I>(&self, names: I) -> Result<(), OrchestratorError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut seen = BTreeSet::new();
        let missing = names
            .into_iter()
            .filter(|name| seen.insert(*name))
            .filter(|name| !self.contains(name))
            .map(str::to_string)
            .collect::<Vec<_>>();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(OrchestratorError::MissingRegisters { names: missing })
        }
    }

    pub fn clear(&mut self) {
        self.registers.clear();
    }

    pub fn len(&self) -> usize {
        self.registers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn iter(&self) -> impl Iterator<Item = &Register> {
        self.registers.values()
    }

    /// Used when restoring a snapshot: every register must still match its digest
    /// and no write may be newer than the stored counter.
    pub fn verify(&self) -> Result<(), OrchestratorError> {
        for register in self.registers.values() {
            if !register.verify_digest() {
                return Err(OrchestratorError::SnapshotIntegrity(format!(
                    "register `{}` does not match its digest",
                    register.name
                )));
            }
            if register.written_at > self.sequence {
                return Err(OrchestratorError::SnapshotIntegrity(format!(
                    "register `{}` was written after the store sequence {}",
                    register.name, self.sequence
                )));
            }
        }
        Ok(())
    }
}

pub fn value_digest(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_json_bytes(value));
    to_hex(&hasher.finalize())
}

fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    const HEX: &[u8; 16] = b"0123456789abcdef";
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}
