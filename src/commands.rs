//! Command table.
//!
//! Maps request keywords to nullary response functions. The table is
//! built once before the listener starts and is shared read-only by every
//! connection task, so lookups need no locking.
//!
//! Matching is exact and case-sensitive on the trimmed request. Anything
//! that does not match gets the `error` sentinel and the connection stays
//! open.

use std::collections::HashMap;
use tracing::warn;

use crate::generator;
use crate::protocol::ERROR_RESPONSE;

/// Default number of random bytes returned by the `bytes` command
pub const DEFAULT_BYTES_LENGTH: usize = 24;

/// A command implementation
pub type CommandFn = Box<dyn Fn() -> String + Send + Sync>;

/// Immutable keyword to function mapping
pub struct CommandTable {
    commands: HashMap<&'static str, CommandFn>,
}

impl CommandTable {
    /// Build the standard table. `bytes_length` sets how many random bytes
    /// the `bytes` command renders.
    pub fn new(bytes_length: usize) -> Self {
        let mut commands: HashMap<&'static str, CommandFn> = HashMap::new();

        commands.insert("ping", Box::new(|| "pong".to_string()));
        commands.insert("noop", Box::new(|| "ok".to_string()));
        commands.insert("version", Box::new(generator::version));
        commands.insert("uuid", Box::new(generator::create_uuid));
        commands.insert("ulid", Box::new(generator::create_ulid));
        commands.insert("guid", Box::new(generator::create_guid));
        commands.insert("tsid", Box::new(generator::create_tsid));
        commands.insert("txid", Box::new(generator::create_txid));
        commands.insert("cuid", Box::new(generator::create_cuid));
        commands.insert("xuid", Box::new(generator::create_xuid));
        commands.insert("bytes", Box::new(move || random_hex(bytes_length)));

        CommandTable { commands }
    }

    /// Run the command named by `request`, or return the error sentinel.
    pub fn dispatch(&self, request: &str) -> String {
        match self.commands.get(request) {
            Some(command) => command(),
            None => ERROR_RESPONSE.to_string(),
        }
    }

    /// Known keywords, sorted
    pub fn keywords(&self) -> Vec<&'static str> {
        let mut keywords: Vec<&'static str> = self.commands.keys().copied().collect();
        keywords.sort_unstable();
        keywords
    }
}

impl Default for CommandTable {
    fn default() -> Self {
        Self::new(DEFAULT_BYTES_LENGTH)
    }
}

fn random_hex(len: usize) -> String {
    match generator::random_bytes(len) {
        Ok(bytes) => generator::to_hex(&bytes),
        Err(e) => {
            warn!(error = %e, "Random byte generation failed");
            ERROR_RESPONSE.to_string()
        }
    }
}
