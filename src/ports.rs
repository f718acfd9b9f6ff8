//! Listen-port selection policy.
//!
//! A port specification is a single port, an explicit list of at least
//! three candidates, or a two-element `[min, max]` range. [`PortSpec::next_port`]
//! walks the candidates given the previously attempted port; the serve loop
//! calls it again whenever a bind fails with address-in-use. The exhaustion
//! messages are part of the server's contract.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PortError {
    #[error("Out of list {0:?}")]
    OutOfList(Vec<u16>),
    #[error("Out of range [{0} - {1}]")]
    OutOfRange(u16, u16),
    #[error("empty port specification")]
    Empty,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PortSpec {
    Single(u16),
    List(Vec<u16>),
    Range(u16, u16),
}

impl PortSpec {
    /// Build a spec from CLI values: one port, a `[min, max]` pair, or a
    /// list of three or more candidates.
    pub fn from_ports(ports: &[u16]) -> Result<Self, PortError> {
        match ports {
            [] => Err(PortError::Empty),
            [port] => Ok(Self::Single(*port)),
            [min, max] => Ok(Self::Range(*min, *max)),
            list => Ok(Self::List(list.to_vec())),
        }
    }

    /// Next candidate after `prev` (`prev = 0` means "first attempt").
    pub fn next_port(&self, prev: u16) -> Result<u16, PortError> {
        match self {
            Self::Single(port) => Ok(*port),
            Self::List(ports) => {
                let mut sorted = ports.clone();
                sorted.sort_unstable();
                sorted
                    .iter()
                    .copied()
                    .find(|port| *port > prev)
                    .ok_or(PortError::OutOfList(sorted))
            }
            Self::Range(min, max) => {
                let candidate = if prev == 0 {
                    *min
                } else {
                    prev.max(*min).saturating_add(1)
                };
                if candidate > *max {
                    Err(PortError::OutOfRange(*min, *max))
                } else {
                    Ok(candidate)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_always_returns_the_port() {
        let spec = PortSpec::Single(3000);
        assert_eq!(spec.next_port(0), Ok(3000));
        assert_eq!(spec.next_port(3000), Ok(3000));
        assert_eq!(spec.next_port(9999), Ok(3000));
    }

    #[test]
    fn list_walks_ascending() {
        let spec = PortSpec::List(vec![3002, 3000, 3001]);
        assert_eq!(spec.next_port(0), Ok(3000));
        assert_eq!(spec.next_port(3000), Ok(3001));
        assert_eq!(spec.next_port(3001), Ok(3002));
        let err = spec.next_port(3002).unwrap_err();
        assert_eq!(err.to_string(), "Out of list [3000, 3001, 3002]");
    }

    #[test]
    fn range_walks_and_exhausts() {
        let spec = PortSpec::Range(3000, 3001);
        assert_eq!(spec.next_port(0), Ok(3000));
        assert_eq!(spec.next_port(3000), Ok(3001));
        let err = spec.next_port(3001).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("3000"), "{message}");
        assert!(message.contains("3001"), "{message}");
        assert_eq!(message, "Out of range [3000 - 3001]");
    }

    #[test]
    fn range_clamps_prev_below_min() {
        let spec = PortSpec::Range(3000, 3005);
        assert_eq!(spec.next_port(100), Ok(3001));
    }

    #[test]
    fn selection_is_deterministic() {
        let spec = PortSpec::List(vec![3010, 3005, 3001]);
        assert_eq!(spec.next_port(3001), spec.next_port(3001));
    }

    #[test]
    fn from_ports_shapes() {
        assert_eq!(PortSpec::from_ports(&[3000]), Ok(PortSpec::Single(3000)));
        assert_eq!(
            PortSpec::from_ports(&[3000, 3010]),
            Ok(PortSpec::Range(3000, 3010))
        );
        assert_eq!(
            PortSpec::from_ports(&[1, 2, 3]),
            Ok(PortSpec::List(vec![1, 2, 3]))
        );
        assert_eq!(PortSpec::from_ports(&[]), Err(PortError::Empty));
    }
}
