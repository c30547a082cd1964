//! Command protocol state machine
//!
//! Parses one protocol line, executes the operation against the bucket
//! registry, and formats the textual reply. The processor never touches the
//! socket: the session loop owns all I/O, so no entry mutex is ever held
//! across a network boundary.
//!
//! # Supported Commands
//!
//! - `CONSUME name`: take one token
//! - `LOCK name`: take one token and hold an exclusive TTL lease
//! - `RELEASE name`: drop the lease
//! - `RATE name value`: change the refill rate
//! - `CAPACITY name value`: change the maximum token count
//! - `STATS name`: one bucket's stats line
//! - `STATUS`: client count, bucket count, and every bucket's stats
//!
//! Command keywords are case-insensitive. Every reply is a single line.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokenbucket::{BucketRegistry, RegistryError};
use tracing::debug;

use crate::connection::ConnectionRegistry;

const VALID_COMMANDS: &str =
    "Valid commands are CONSUME, RATE, LOCK, RELEASE, CAPACITY, STATS, and STATUS";

/// Executes protocol commands against the bucket registry.
pub struct CommandProcessor {
    registry: Arc<BucketRegistry>,
    connections: Arc<ConnectionRegistry>,
    lock_duration: Duration,
}

impl CommandProcessor {
    pub fn new(
        registry: Arc<BucketRegistry>,
        connections: Arc<ConnectionRegistry>,
        lock_duration: Duration,
    ) -> Self {
        CommandProcessor {
            registry,
            connections,
            lock_duration,
        }
    }

    /// Process one protocol line and return the reply line (no trailing
    /// newline).
    ///
    /// Registry errors are rendered as `ERROR <message>` replies rather than
    /// propagated; a bad command never costs the client its connection.
    pub fn process(&self, line: &str, now: Instant) -> String {
        let mut parts = line.split_whitespace();
        let command = parts.next().unwrap_or("");
        let name = parts.next();
        let parameter = parts.next();

        let result = match command.to_uppercase().as_str() {
            "CONSUME" => self.consume(name.unwrap_or(""), now),
            "LOCK" => self.lock(name.unwrap_or(""), now),
            "RELEASE" => self.release(name.unwrap_or(""), now),
            "RATE" => self.set_rate(name.unwrap_or(""), parameter, now),
            "CAPACITY" => self.set_capacity(name.unwrap_or(""), parameter, now),
            "STATS" => self.stats(name, now),
            "STATUS" => self.status(now),
            _ => Ok(format!("ERROR Unknown command {command}. {VALID_COMMANDS}")),
        };

        match result {
            Ok(reply) => reply,
            Err(e) => {
                debug!("Rejected {:?}: {}", line.trim_end(), e);
                format!("ERROR {e}")
            }
        }
    }

    fn consume(&self, name: &str, now: Instant) -> Result<String, RegistryError> {
        let entry = self.registry.get_or_create(name, now)?;
        let mut state = entry.lock_state();

        if let Some(remaining) = state.lock_remaining(now) {
            return Ok(format!(
                "WAIT {} Bucket {} is locked",
                fmt_secs(remaining),
                name
            ));
        }

        if state.bucket.consume(now) {
            Ok(format!("OK {}", state.stats_line(now)))
        } else {
            let wait = state.bucket.time_until_next_token(now);
            Ok(format!("WAIT {} {}", fmt_secs(wait), state.stats_line(now)))
        }
    }

    fn lock(&self, name: &str, now: Instant) -> Result<String, RegistryError> {
        let entry = self.registry.get_or_create(name, now)?;
        // One critical section for the whole check-and-act: two racing LOCKs
        // cannot both observe "unlocked" and both win.
        let mut state = entry.lock_state();

        if state.lock_remaining(now).is_some() {
            return Ok(format!("ERROR Bucket {name} is already locked"));
        }

        if state.bucket.consume(now) {
            state.locked_until = Some(now + self.lock_duration);
            Ok(format!(
                "OK LOCKED {name}. Will force unlock in {} seconds.",
                self.lock_duration.as_secs()
            ))
        } else {
            let wait = state.bucket.time_until_next_token(now);
            Ok(format!("WAIT {} {}", fmt_secs(wait), state.stats_line(now)))
        }
    }

    fn release(&self, name: &str, now: Instant) -> Result<String, RegistryError> {
        let entry = self.registry.get_or_create(name, now)?;
        entry.lock_state().locked_until = None;
        Ok(format!("OK RELEASED {name}"))
    }

    fn set_rate(
        &self,
        name: &str,
        parameter: Option<&str>,
        now: Instant,
    ) -> Result<String, RegistryError> {
        let entry = self.registry.get_or_create(name, now)?;

        let value = parameter
            .and_then(|p| p.parse::<f64>().ok())
            .filter(|v| v.is_finite() && *v > 0.0);
        let Some(value) = value else {
            return Ok(format!(
                "ERROR RATE requires a positive number, got {}",
                parameter.unwrap_or("nothing")
            ));
        };

        entry.lock_state().bucket.set_rate(value, now);
        Ok(format!("OK RATE set to {value} for bucket {name}"))
    }

    fn set_capacity(
        &self,
        name: &str,
        parameter: Option<&str>,
        now: Instant,
    ) -> Result<String, RegistryError> {
        let entry = self.registry.get_or_create(name, now)?;

        let value = parameter
            .and_then(|p| p.parse::<u64>().ok())
            .filter(|v| *v > 0);
        let Some(value) = value else {
            return Ok(format!(
                "ERROR CAPACITY requires a positive integer, got {}",
                parameter.unwrap_or("nothing")
            ));
        };

        entry.lock_state().bucket.set_capacity(value as f64, now);
        Ok(format!("OK CAPACITY set to {value} for bucket {name}"))
    }

    fn stats(&self, name: Option<&str>, now: Instant) -> Result<String, RegistryError> {
        match name {
            Some(name) => self.registry.stats_line(name, now),
            None => Ok("ERROR STATS require a bucket name".to_string()),
        }
    }

    fn status(&self, now: Instant) -> Result<String, RegistryError> {
        let clients = self.connections.len();
        let (buckets, summary) = self.registry.status_summary(now);
        Ok(format!(
            "OK STATUS clients={clients} buckets={buckets} {summary}"
        ))
    }
}

/// Seconds as a bare number, fractional where needed (`0.5`, `300`).
fn fmt_secs(duration: Duration) -> String {
    format!("{}", duration.as_secs_f64())
}
