//! Single-field mutations of versioned documents
//!
//! A mutation describes one change to a document snapshot. It never touches
//! the network: the client's retry-update engine applies it, persists the
//! document, and on a revision conflict reloads the snapshot and asks the
//! mutation whether the fresh copy already holds the desired value.

/// A change to one field of a document of type `D`
pub trait Mutation<D> {
    /// Name of the field being changed, used in log output
    fn field(&self) -> &'static str;

    /// True when the change carries nothing to write (e.g. an empty message)
    fn is_noop(&self) -> bool {
        false
    }

    /// Refuse to change `doc`, giving the reason
    ///
    /// Checked against the snapshot before every apply, including snapshots
    /// reloaded after a conflict.
    fn check(&self, _doc: &D) -> Result<(), String> {
        Ok(())
    }

    /// Perform the change on the in-memory snapshot
    fn apply(&self, doc: &mut D);

    /// True when `doc` already reflects the desired end state
    fn is_satisfied(&self, doc: &D) -> bool;
}
