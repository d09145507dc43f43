use crate::values::{AclKey, AclValue};
use serde::{Deserialize, Serialize};

/// One deferred mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    /// Union `values` into the set at `key`
    Add {
        bucket: String,
        key: AclKey,
        values: Vec<AclValue>,
    },
    /// Delete `keys` (rows, or sub-keys of a permission bucket)
    Delete { bucket: String, keys: Vec<AclKey> },
    /// Take `values` out of the set at `key`
    Remove {
        bucket: String,
        key: AclKey,
        values: Vec<AclValue>,
    },
}

impl Command {
    pub fn bucket(&self) -> &str {
        match self {
            Self::Add { bucket, .. } | Self::Delete { bucket, .. } | Self::Remove { bucket, .. } => {
                bucket
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Add { .. } => "add",
            Self::Delete { .. } => "del",
            Self::Remove { .. } => "remove",
        }
    }
}

/// An ordered batch of commands, applied in order by `end`.
///
/// Building a transaction performs no I/O.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transaction {
    commands: Vec<Command>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn into_commands(self) -> Vec<Command> {
        self.commands
    }
}

impl IntoIterator for Transaction {
    type Item = Command;
    type IntoIter = std::vec::IntoIter<Command>;

    fn into_iter(self) -> Self::IntoIter {
        self.commands.into_iter()
    }
}
