//! Permission collaborator for privileged operations.

use crate::types::Address;
use std::collections::BTreeSet;
use std::fmt;

pub trait Authority: fmt::Debug {
    fn is_authorized(&self, sender: &Address) -> bool;
}

/// Fixed allow-list of admin addresses.
#[derive(Debug, Clone, Default)]
pub struct Sudoers {
    members: BTreeSet<Address>,
}

impl Sudoers {
    pub fn new(members: impl IntoIterator<Item = Address>) -> Self {
        Self {
            members: members.into_iter().collect(),
        }
    }
}

impl Authority for Sudoers {
    fn is_authorized(&self, sender: &Address) -> bool {
        self.members.contains(sender)
    }
}
