//! Mint-intent heuristics over a decoded call.
//!
//! Three gates, applied in order, each a case-insensitive substring match:
//! function-name blacklist, function-name whitelist, parameter-name
//! blacklist. A call passes only if it clears all three.

use crate::config::MonitorConfig;
use crate::metadata::{CallDecoder, DecodedCall};
use std::fmt;

/// Outcome of [`IntentFilter::check`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IntentVerdict {
    Accepted { function: String },
    BlacklistedName { function: String, term: String },
    NotWhitelisted { function: String },
    BlacklistedParameter { function: String, parameter: String, term: String },
    /// Contract interface was not resolved.
    NoInterface,
    /// Calldata did not decode against the interface.
    Undecodable(String),
}

impl IntentVerdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, IntentVerdict::Accepted { .. })
    }
}

impl fmt::Display for IntentVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntentVerdict::Accepted { function } => write!(f, "accepted {function}"),
            IntentVerdict::BlacklistedName { function, term } => {
                write!(f, "{function} matches blacklisted term '{term}'")
            }
            IntentVerdict::NotWhitelisted { function } => {
                write!(f, "{function} matches no whitelisted term")
            }
            IntentVerdict::BlacklistedParameter {
                function,
                parameter,
                term,
            } => write!(
                f,
                "{function} parameter '{parameter}' matches blacklisted term '{term}'"
            ),
            IntentVerdict::NoInterface => write!(f, "no contract interface"),
            IntentVerdict::Undecodable(reason) => write!(f, "undecodable call: {reason}"),
        }
    }
}

pub struct IntentFilter<'a> {
    function_whitelist: &'a [String],
    function_blacklist: &'a [String],
    parameter_blacklist: &'a [String],
}

impl<'a> IntentFilter<'a> {
    /// Borrow the term lists of a validated (lowercased) config.
    pub fn new(config: &'a MonitorConfig) -> Self {
        Self {
            function_whitelist: &config.function_whitelist,
            function_blacklist: &config.function_blacklist,
            parameter_blacklist: &config.parameter_blacklist,
        }
    }

    /// Decode `input` with `decoder` and evaluate the result.
    pub fn check<D: CallDecoder>(&self, input: &[u8], decoder: Option<&D>) -> IntentVerdict {
        let Some(decoder) = decoder else {
            return IntentVerdict::NoInterface;
        };
        match decoder.decode_call(input) {
            Ok(call) => self.evaluate(&call),
            Err(err) => IntentVerdict::Undecodable(err.to_string()),
        }
    }

    pub fn evaluate(&self, call: &DecodedCall) -> IntentVerdict {
        let function = call.name.clone();
        let name = call.name.to_lowercase();

        if let Some(term) = first_match(&name, self.function_blacklist) {
            return IntentVerdict::BlacklistedName {
                function,
                term: term.to_string(),
            };
        }
        if first_match(&name, self.function_whitelist).is_none() {
            return IntentVerdict::NotWhitelisted { function };
        }
        for parameter in &call.param_names {
            if let Some(term) = first_match(&parameter.to_lowercase(), self.parameter_blacklist) {
                return IntentVerdict::BlacklistedParameter {
                    function,
                    parameter: parameter.clone(),
                    term: term.to_string(),
                };
            }
        }

        IntentVerdict::Accepted { function }
    }
}

fn first_match<'t>(haystack: &str, terms: &'t [String]) -> Option<&'t str> {
    terms
        .iter()
        .find(|term| haystack.contains(term.as_str()))
        .map(String::as_str)
}
