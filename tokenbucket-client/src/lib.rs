//! Async client library for the tokenbucketd admission control daemon
//!
//! Speaks the newline-delimited text protocol over TCP: one command line
//! out, one reply line back.
//!
//! # Example
//!
//! ```no_run
//! use tokenbucket_client::TokenBucketClient;
//!
//! # async fn example() -> tokenbucket_client::Result<()> {
//! let mut client = TokenBucketClient::connect("127.0.0.1:4444").await?;
//!
//! // Block (client-side) until a token is granted, honoring WAIT hints
//! client.acquire("api.search").await?;
//!
//! // Or handle the admission decision yourself
//! match client.consume("api.search").await? {
//!     tokenbucket_client::Reply::Ok(stats) => println!("admitted: {stats}"),
//!     tokenbucket_client::Reply::Wait { seconds, .. } => println!("retry in {seconds}s"),
//!     tokenbucket_client::Reply::Error(msg) => println!("rejected: {msg}"),
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;

pub use client::{Reply, TokenBucketClient};
pub use error::{ClientError, Result};
