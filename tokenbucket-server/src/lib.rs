//! # tokenbucketd
//!
//! A network-accessible token bucket admission control daemon.
//!
//! ## Purpose
//!
//! tokenbucketd centralizes admission control: clients open a TCP connection
//! and issue newline-terminated text commands to consume from, inspect, or
//! reconfigure independent named token buckets, and optionally take a
//! time-boxed exclusive hold (a TTL lease) on a bucket. Buckets are created
//! on first reference and reaped after a configurable idle period, so the
//! daemon's memory use stays bounded without any client-side lifecycle
//! management.
//!
//! ## Quick Start
//!
//! ```bash
//! # Defaults: 127.0.0.1:4444, 1 token/sec, capacity 1
//! tokenbucketd
//!
//! # A burstier default profile, verbose logging
//! tokenbucketd --rate 10 --capacity 50 --log-level debug
//! ```
//!
//! Talking to it needs nothing more than a line-oriented TCP client:
//!
//! ```bash
//! $ nc localhost 4444
//! CONSUME api.search
//! OK tokens=0,rate=1,capacity=1
//! CONSUME api.search
//! WAIT 1 tokens=0,rate=1,capacity=1
//! ```
//!
//! ## Protocol
//!
//! One command per line, one reply line per command:
//!
//! | Command | Reply |
//! |---------|-------|
//! | `CONSUME name` | `OK <stats>`, or `WAIT <seconds> ...` |
//! | `LOCK name` | `OK LOCKED name. ...`, `ERROR Bucket name is already locked`, or `WAIT ...` |
//! | `RELEASE name` | `OK RELEASED name` |
//! | `RATE name value` | `OK RATE set to value for bucket name` |
//! | `CAPACITY name value` | `OK CAPACITY set to value for bucket name` |
//! | `STATS name` | `tokens=<t>,rate=<r>,capacity=<c>` |
//! | `STATUS` | `OK STATUS clients=<n> buckets=<m> <per-bucket stats>` |
//!
//! `WAIT` hints are advisory: the server never sleeps on a client's behalf,
//! it tells the client how long to back off and lets it retry.
//!
//! ## Architecture
//!
//! One tokio task per accepted connection feeds lines to the command
//! processor; a background reaper task sweeps idle buckets. The bucket
//! registry is the only shared structure, and each bucket entry carries its
//! own mutex, so sessions hammering different buckets never contend.
//!
//! ```text
//! ┌─────────┐  ┌─────────┐  ┌─────────┐
//! │ session │  │ session │  │ session │   (one task each)
//! └────┬────┘  └────┬────┘  └────┬────┘
//!      └────────────┼────────────┘
//!              ┌────▼─────┐      ┌────────┐
//!              │  bucket  │◄─────┤ reaper │
//!              │ registry │      └────────┘
//!              └──────────┘
//! ```
//!
//! ## Configuration
//!
//! CLI flags or `TOKENBUCKETD_*` environment variables (CLI wins); see
//! `tokenbucketd --help` and `tokenbucketd --list-env-vars`.

pub mod command;
pub mod config;
pub mod connection;
pub mod reaper;
pub mod server;
