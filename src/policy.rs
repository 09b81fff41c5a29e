//! Region-wide data retrieval policies.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::connection::{read_json, Connection};
use crate::error::{Error, ErrorKind, Result};
use crate::payload::Payload;

/// How the account's retrieval rate is limited. There is one policy per
/// region per account; changing it does not affect jobs already in
/// progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataRetrievalStrategy {
    /// Cap the peak retrieval rate across all in-progress jobs at a
    /// bytes-per-hour limit; requests that would exceed it are rejected.
    BytesPerHour,
    /// Keep retrievals within the daily free tier allowance; requests
    /// that would exceed it are rejected.
    FreeTier,
    /// Accept all valid retrieval requests.
    None,
}

impl fmt::Display for DataRetrievalStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataRetrievalStrategy::BytesPerHour => write!(f, "BytesPerHour"),
            DataRetrievalStrategy::FreeTier => write!(f, "FreeTier"),
            DataRetrievalStrategy::None => write!(f, "None"),
        }
    }
}

impl FromStr for DataRetrievalStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        // Accept any spacing and casing: "bytes per hour" == "BytesPerHour".
        let folded: String = s
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_lowercase();
        match folded.as_str() {
            "bytesperhour" => Ok(DataRetrievalStrategy::BytesPerHour),
            "freetier" => Ok(DataRetrievalStrategy::FreeTier),
            "none" => Ok(DataRetrievalStrategy::None),
            _ => Err(
                Error::new(ErrorKind::Config, "unknown data retrieval strategy")
                    .with_operation("policy::from_str"),
            ),
        }
    }
}

/// A region-wide data retrieval policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataRetrievalPolicy {
    /// The rate limiting strategy.
    pub strategy: DataRetrievalStrategy,
    /// Bytes-per-hour cap; required by, and only meaningful for, the
    /// [`BytesPerHour`](DataRetrievalStrategy::BytesPerHour) strategy.
    pub bytes_per_hour: Option<u64>,
}

#[derive(Serialize, Deserialize)]
struct PolicyWire {
    #[serde(rename = "Policy")]
    policy: RulesWire,
}

#[derive(Serialize, Deserialize)]
struct RulesWire {
    #[serde(rename = "Rules")]
    rules: Vec<RuleWire>,
}

#[derive(Serialize, Deserialize)]
struct RuleWire {
    #[serde(rename = "Strategy")]
    strategy: String,
    #[serde(
        rename = "BytesPerHour",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    bytes_per_hour: Option<u64>,
}

impl Connection {
    /// The current data retrieval policy for this connection's region.
    pub fn get_data_retrieval_policy(&self) -> Result<DataRetrievalPolicy> {
        let mut req = self.request("GET", &self.policy_url("data-retrieval"))?;
        self.sign(&mut req, Payload::InMemory(Vec::new()))?;
        let response = self.execute(req, &[200])?;

        let wire: PolicyWire = read_json(response)?;
        let rule = wire.policy.rules.into_iter().next().ok_or_else(|| {
            Error::new(ErrorKind::Service, "policy response has no rules")
                .with_operation("policy::get_data_retrieval_policy")
        })?;

        Ok(DataRetrievalPolicy {
            strategy: rule.strategy.parse()?,
            bytes_per_hour: rule.bytes_per_hour,
        })
    }

    /// Set and enact the data retrieval policy for this connection's
    /// region. The policy takes effect within a few minutes.
    pub fn set_data_retrieval_policy(&self, policy: &DataRetrievalPolicy) -> Result<()> {
        if policy.strategy == DataRetrievalStrategy::BytesPerHour
            && policy.bytes_per_hour.is_none()
        {
            return Err(Error::new(
                ErrorKind::Config,
                "BytesPerHour strategy requires a bytes-per-hour cap",
            )
            .with_operation("policy::set_data_retrieval_policy"));
        }

        let wire = PolicyWire {
            policy: RulesWire {
                rules: vec![RuleWire {
                    strategy: policy.strategy.to_string(),
                    bytes_per_hour: policy.bytes_per_hour,
                }],
            },
        };
        let body = serde_json::to_vec(&wire).map_err(|e| {
            Error::new(ErrorKind::Encoding, "encoding policy failed")
                .with_operation("policy::set_data_retrieval_policy")
                .set_source(e)
        })?;

        let mut req = self.request("PUT", &self.policy_url("data-retrieval"))?;
        self.sign(&mut req, Payload::InMemory(body))?;
        self.execute(req, &[204])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_round_trip() {
        for strategy in [
            DataRetrievalStrategy::BytesPerHour,
            DataRetrievalStrategy::FreeTier,
            DataRetrievalStrategy::None,
        ] {
            let parsed: DataRetrievalStrategy =
                strategy.to_string().parse().expect("must parse");
            assert_eq!(parsed, strategy);
        }
    }

    #[test]
    fn test_strategy_parse_loose() {
        assert_eq!(
            "bytes per hour".parse::<DataRetrievalStrategy>().expect("must parse"),
            DataRetrievalStrategy::BytesPerHour
        );
        assert_eq!(
            "freetier".parse::<DataRetrievalStrategy>().expect("must parse"),
            DataRetrievalStrategy::FreeTier
        );
        assert!("unlimited".parse::<DataRetrievalStrategy>().is_err());
    }

    #[test]
    fn test_policy_wire_format() {
        let wire = PolicyWire {
            policy: RulesWire {
                rules: vec![RuleWire {
                    strategy: "BytesPerHour".to_string(),
                    bytes_per_hour: Some(10737418240),
                }],
            },
        };
        assert_eq!(
            serde_json::to_string(&wire).expect("must serialize"),
            r#"{"Policy":{"Rules":[{"Strategy":"BytesPerHour","BytesPerHour":10737418240}]}}"#
        );

        let wire = PolicyWire {
            policy: RulesWire {
                rules: vec![RuleWire {
                    strategy: "FreeTier".to_string(),
                    bytes_per_hour: None,
                }],
            },
        };
        assert_eq!(
            serde_json::to_string(&wire).expect("must serialize"),
            r#"{"Policy":{"Rules":[{"Strategy":"FreeTier"}]}}"#
        );
    }

    #[test]
    fn test_policy_wire_parse() {
        let content = r#"{"Policy":{"Rules":[{"BytesPerHour":10737418240,"Strategy":"BytesPerHour"}]}}"#;
        let wire: PolicyWire = serde_json::from_str(content).expect("must deserialize");
        let rule = &wire.policy.rules[0];
        assert_eq!(rule.strategy, "BytesPerHour");
        assert_eq!(rule.bytes_per_hour, Some(10737418240));
    }
}
