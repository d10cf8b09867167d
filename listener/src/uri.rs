use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::Error;

const DEFAULT_PORT: u16 = 1234;

/// A `udp://[bind_ip]@[join_ip][:port]` locator.
///
/// Missing pieces fall back to the unspecified address and port 1234:
///
/// | uri                          | bind      | join        | port |
/// |------------------------------|-----------|-------------|------|
/// | `udp://@239.0.0.1:5004`      | 0.0.0.0   | 239.0.0.1   | 5004 |
/// | `udp://10.0.0.2@239.0.0.1`   | 10.0.0.2  | 239.0.0.1   | 1234 |
/// | `udp://:5004`                | 0.0.0.0   | 0.0.0.0     | 5004 |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Uri {
    pub bind: Ipv4Addr,
    pub join: Ipv4Addr,
    pub port: u16,
}

impl FromStr for Uri {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let rest = value
            .strip_prefix("udp://")
            .ok_or(Error::InvalidArgument("uri protocol is not udp"))?;

        let (bind, rest) = match rest.split_once('@') {
            Some((bind, rest)) => (parse_ip(bind)?, rest),
            None => (Ipv4Addr::UNSPECIFIED, rest),
        };

        let (join, port) = match rest.split_once(':') {
            Some((join, port)) => (
                parse_ip(join)?,
                port.parse()
                    .map_err(|_| Error::InvalidArgument("invalid port in uri"))?,
            ),
            None => (parse_ip(rest)?, DEFAULT_PORT),
        };

        Ok(Self { bind, join, port })
    }
}

fn parse_ip(value: &str) -> Result<Ipv4Addr, Error> {
    if value.is_empty() {
        return Ok(Ipv4Addr::UNSPECIFIED);
    }

    value
        .parse()
        .map_err(|_| Error::InvalidArgument("invalid ip address in uri"))
}
