use std::fmt;
use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TransportError};

/// Internet address family of a socket endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
}

impl AddressFamily {
    /// Family of an IP address.
    pub fn of(ip: &IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => AddressFamily::Ipv4,
            IpAddr::V6(_) => AddressFamily::Ipv6,
        }
    }

    /// Family of a socket address.
    pub fn of_addr(addr: &SocketAddr) -> Self {
        Self::of(&addr.ip())
    }

    /// Fail unless `addr` belongs to this family.
    pub fn check(self, addr: &SocketAddr) -> Result<()> {
        let actual = Self::of_addr(addr);
        if actual == self {
            Ok(())
        } else {
            Err(TransportError::AddressFamily {
                addr: *addr,
                actual,
                expected: self,
            })
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AddressFamily::Ipv4 => "ipv4",
            AddressFamily::Ipv6 => "ipv6",
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, Ipv6Addr};

    use super::*;

    #[test]
    fn classifies_ip_addresses() {
        assert_eq!(
            AddressFamily::of(&IpAddr::V4(Ipv4Addr::LOCALHOST)),
            AddressFamily::Ipv4
        );
        assert_eq!(
            AddressFamily::of(&IpAddr::V6(Ipv6Addr::LOCALHOST)),
            AddressFamily::Ipv6
        );
    }

    #[test]
    fn classifies_socket_addresses() {
        let v4: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let v6: SocketAddr = "[::1]:9000".parse().unwrap();
        assert_eq!(AddressFamily::of_addr(&v4), AddressFamily::Ipv4);
        assert_eq!(AddressFamily::of_addr(&v6), AddressFamily::Ipv6);
        assert_eq!(AddressFamily::Ipv6.to_string(), "ipv6");
    }

    #[test]
    fn check_rejects_other_family() {
        let v6: SocketAddr = "[::1]:9000".parse().unwrap();
        assert!(AddressFamily::Ipv6.check(&v6).is_ok());

        let err = AddressFamily::Ipv4.check(&v6).unwrap_err();
        assert!(matches!(
            err,
            TransportError::AddressFamily {
                actual: AddressFamily::Ipv6,
                expected: AddressFamily::Ipv4,
                ..
            }
        ));
        assert_eq!(err.io_kind(), None);
    }
}
