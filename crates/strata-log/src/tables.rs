//! Redb table definitions for the commit log.

use redb::TableDefinition;

// Node key -> bincode-encoded Node
pub const NODES: TableDefinition<&str, &[u8]> = TableDefinition::new("nodes");
// Change number -> node key, in append order
pub const SEQUENCE: TableDefinition<u64, &str> = TableDefinition::new("sequence");

// Layer id -> head node key (advances on every commit)
pub const HEADS: TableDefinition<&str, &str> = TableDefinition::new("heads");
// Node key -> layer id (assigned once)
pub const LAYERS: TableDefinition<&str, &str> = TableDefinition::new("layers");

// Ordered data index: !latest!... and !changes!... -> pointer
pub const DATA: TableDefinition<&str, &str> = TableDefinition::new("data");

// Store-wide settings
pub const META: TableDefinition<&str, &str> = TableDefinition::new("meta");

/// META key of the default layer
pub const MAIN_LAYER: &str = "main_layer";
