//! Snapshot values (C6): one `<Shot>` element, a delta image with an
//! optional parent pointer.

use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub identifier: Uuid,
    pub parent_identifier: Option<Uuid>,
    pub filename: String,
}

impl Snapshot {
    pub fn new(identifier: Uuid, parent_identifier: Option<Uuid>, filename: String) -> Self {
        Snapshot {
            identifier,
            parent_identifier,
            filename,
        }
    }

    /// A snapshot whose parent identifier is absent is a root snapshot.
    pub fn is_root(&self) -> bool {
        self.parent_identifier.is_none()
    }
}
