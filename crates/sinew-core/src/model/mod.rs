//! Work-item data model: validated ids, closed enumerations, and the
//! node aggregate itself. Edges are *not* modeled here — they live in the
//! graph store's id-keyed indexes.

pub mod item;
pub mod item_id;
