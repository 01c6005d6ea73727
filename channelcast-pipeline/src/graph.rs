//! Filter graph parsing.
//!
//! Reads an emitted `-filter_complex` value back into its chains and filters
//! so callers and tests can inspect what a plan does without string matching.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A parsed filter with name and parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedFilter {
    pub name: String,
    pub params: Vec<FilterParam>,
}

/// A filter parameter (key=value or positional).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterParam {
    pub key: Option<String>,
    pub value: String,
}

/// Filters connected with commas, with their pad labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedChain {
    pub inputs: Vec<String>,
    pub filters: Vec<ParsedFilter>,
    pub outputs: Vec<String>,
}

/// A complete filter graph (chains connected with semicolons).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterGraph {
    pub chains: Vec<ParsedChain>,
}

impl FilterGraph {
    /// Parse a filter graph string such as
    /// `[0:0]yadif=1,scale=1280:720[vout];[0:1]aresample=async=1[aout]`.
    pub fn parse(input: &str) -> Self {
        let chains = input
            .split(';')
            .map(str::trim)
            .filter(|chain| !chain.is_empty())
            .map(parse_chain)
            .collect();
        FilterGraph { chains }
    }

    /// Every filter, in graph order.
    pub fn filters(&self) -> impl Iterator<Item = &ParsedFilter> {
        self.chains.iter().flat_map(|chain| chain.filters.iter())
    }

    pub fn filter_names(&self) -> Vec<&str> {
        self.filters().map(|f| f.name.as_str()).collect()
    }

    /// Number of filters called `name`.
    pub fn count(&self, name: &str) -> usize {
        self.filters().filter(|f| f.name == name).count()
    }

    /// Position of the first filter called `name`.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.filters().position(|f| f.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// The chain ending in output pad `label`.
    pub fn chain_for_output(&self, label: &str) -> Option<&ParsedChain> {
        self.chains
            .iter()
            .find(|chain| chain.outputs.iter().any(|o| o == label))
    }
}

impl ParsedFilter {
    /// Value of the named parameter.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|p| p.key.as_deref() == Some(key))
            .map(|p| p.value.as_str())
    }

    /// The `index`-th positional parameter.
    pub fn positional(&self, index: usize) -> Option<&str> {
        self.params
            .iter()
            .filter(|p| p.key.is_none())
            .nth(index)
            .map(|p| p.value.as_str())
    }
}

impl fmt::Display for ParsedFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            f.write_str(if i == 0 { "=" } else { ":" })?;
            if let Some(key) = &param.key {
                write!(f, "{}=", key)?;
            }
            f.write_str(&param.value)?;
        }
        Ok(())
    }
}

impl fmt::Display for ParsedChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for label in &self.inputs {
            write!(f, "[{}]", label)?;
        }
        for (i, filter) in self.filters.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", filter)?;
        }
        for label in &self.outputs {
            write!(f, "[{}]", label)?;
        }
        Ok(())
    }
}

impl fmt::Display for FilterGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, chain) in self.chains.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            write!(f, "{}", chain)?;
        }
        Ok(())
    }
}

fn parse_chain(s: &str) -> ParsedChain {
    let mut rest = s;
    let mut inputs = Vec::new();
    while let Some(stripped) = rest.strip_prefix('[') {
        let Some((label, tail)) = stripped.split_once(']') else {
            break;
        };
        inputs.push(label.to_string());
        rest = tail;
    }

    let mut outputs = Vec::new();
    while let Some(stripped) = rest.strip_suffix(']') {
        let Some(start) = stripped.rfind('[') else {
            break;
        };
        outputs.insert(0, stripped[start + 1..].to_string());
        rest = &stripped[..start];
    }

    let filters = rest
        .split(',')
        .map(str::trim)
        .filter(|filter| !filter.is_empty())
        .map(parse_single_filter)
        .collect();
    ParsedChain {
        inputs,
        filters,
        outputs,
    }
}

fn parse_single_filter(s: &str) -> ParsedFilter {
    // name=param1:param2:key=value
    let (name, params) = match s.split_once('=') {
        Some((name, params)) => (name.trim(), Some(params)),
        None => (s.trim(), None),
    };

    let params = params
        .map(|p| {
            p.split(':')
                .map(|param| match param.split_once('=') {
                    Some((key, value)) => FilterParam {
                        key: Some(key.to_string()),
                        value: value.to_string(),
                    },
                    None => FilterParam {
                        key: None,
                        value: param.to_string(),
                    },
                })
                .collect()
        })
        .unwrap_or_default();

    ParsedFilter {
        name: name.to_string(),
        params,
    }
}
