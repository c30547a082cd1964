//! Line-protocol client for tokenbucketd
//!
//! One in-flight command at a time per connection, matching the server's
//! strictly sequential per-session processing.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::debug;

use crate::error::{ClientError, Result};

/// A parsed server reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// `OK ...`: the command succeeded; the payload after `OK`
    Ok(String),
    /// `WAIT <seconds> ...`: denied, with an advisory backoff hint
    Wait { seconds: f64, detail: String },
    /// `ERROR ...`: rejected
    Error(String),
}

impl Reply {
    /// Parse one reply line (without the trailing newline).
    pub fn parse(line: &str) -> Result<Reply> {
        let (status, rest) = line.split_once(' ').unwrap_or((line, ""));
        match status {
            "OK" => Ok(Reply::Ok(rest.to_string())),
            "WAIT" => {
                let (seconds, detail) = rest.split_once(' ').unwrap_or((rest, ""));
                let seconds = seconds
                    .parse::<f64>()
                    .map_err(|_| ClientError::Protocol(format!("bad WAIT hint in {line:?}")))?;
                Ok(Reply::Wait {
                    seconds,
                    detail: detail.to_string(),
                })
            }
            "ERROR" => Ok(Reply::Error(rest.to_string())),
            _ => Err(ClientError::Protocol(format!(
                "unrecognized reply {line:?}"
            ))),
        }
    }
}

/// Async client for the tokenbucketd text protocol.
pub struct TokenBucketClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TokenBucketClient {
    /// Connect to a running daemon.
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        let (reader, writer) = stream.into_split();
        Ok(TokenBucketClient {
            reader: BufReader::new(reader),
            writer,
        })
    }

    /// Take one token from `bucket`.
    pub async fn consume(&mut self, bucket: &str) -> Result<Reply> {
        self.command(&format!("CONSUME {bucket}")).await
    }

    /// Take one token and an exclusive TTL lease on `bucket`.
    pub async fn lock(&mut self, bucket: &str) -> Result<Reply> {
        self.command(&format!("LOCK {bucket}")).await
    }

    /// Drop the lease on `bucket`.
    pub async fn release(&mut self, bucket: &str) -> Result<Reply> {
        self.command(&format!("RELEASE {bucket}")).await
    }

    /// Change the refill rate of `bucket`.
    pub async fn set_rate(&mut self, bucket: &str, rate: f64) -> Result<Reply> {
        self.command(&format!("RATE {bucket} {rate}")).await
    }

    /// Change the capacity of `bucket`.
    pub async fn set_capacity(&mut self, bucket: &str, capacity: u64) -> Result<Reply> {
        self.command(&format!("CAPACITY {bucket} {capacity}")).await
    }

    /// Fetch `bucket`'s stats line (`tokens=<t>,rate=<r>,capacity=<c>`).
    ///
    /// STATS replies are the bare stats line, so this returns the raw text
    /// rather than a [`Reply`].
    pub async fn stats(&mut self, bucket: &str) -> Result<String> {
        let line = self.roundtrip(&format!("STATS {bucket}")).await?;
        if line.starts_with("ERROR ") {
            return Err(ClientError::Server(line[6..].to_string()));
        }
        Ok(line)
    }

    /// Consume from `bucket`, sleeping out WAIT hints until a token is
    /// granted.
    ///
    /// Returns the stats payload of the successful consume. An `ERROR`
    /// reply aborts the loop; retrying a rejected command would never
    /// succeed.
    pub async fn acquire(&mut self, bucket: &str) -> Result<String> {
        loop {
            match self.consume(bucket).await? {
                Reply::Ok(stats) => return Ok(stats),
                Reply::Wait { seconds, .. } => {
                    debug!("Bucket {} denied, retrying in {}s", bucket, seconds);
                    tokio::time::sleep(Duration::from_secs_f64(seconds.max(0.0))).await;
                }
                Reply::Error(msg) => return Err(ClientError::Server(msg)),
            }
        }
    }

    /// Send a raw command line and parse the reply.
    pub async fn command(&mut self, line: &str) -> Result<Reply> {
        let reply = self.roundtrip(line).await?;
        Reply::parse(&reply)
    }

    async fn roundtrip(&mut self, line: &str) -> Result<String> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;

        let mut reply = String::new();
        let n = self.reader.read_line(&mut reply).await?;
        if n == 0 {
            return Err(ClientError::ConnectionClosed);
        }
        Ok(reply.trim_end().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ok() {
        assert_eq!(
            Reply::parse("OK tokens=0,rate=1,capacity=1").unwrap(),
            Reply::Ok("tokens=0,rate=1,capacity=1".to_string())
        );
        assert_eq!(
            Reply::parse("OK RELEASED foo").unwrap(),
            Reply::Ok("RELEASED foo".to_string())
        );
    }

    #[test]
    fn test_parse_wait() {
        let reply = Reply::parse("WAIT 0.5 tokens=0,rate=2,capacity=1").unwrap();
        assert_eq!(
            reply,
            Reply::Wait {
                seconds: 0.5,
                detail: "tokens=0,rate=2,capacity=1".to_string()
            }
        );

        let reply = Reply::parse("WAIT 299.7 Bucket foo is locked").unwrap();
        match reply {
            Reply::Wait { seconds, detail } => {
                assert_eq!(seconds, 299.7);
                assert_eq!(detail, "Bucket foo is locked");
            }
            other => panic!("expected WAIT, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_error() {
        assert_eq!(
            Reply::parse("ERROR Too many buckets").unwrap(),
            Reply::Error("Too many buckets".to_string())
        );
    }

    #[test]
    fn test_parse_garbage() {
        assert!(Reply::parse("tokens=1,rate=1,capacity=1").is_err());
        assert!(Reply::parse("WAIT notanumber x").is_err());
        assert!(Reply::parse("").is_err());
    }
}
