//! Slice specifications: parsing, composition and resolution to absolute ranges.
//!
//! A [`ReadInstruction`] is an ordered list of [`RelativeInstruction`] terms, written
//! in the slice mini-language as `name`, `name[a:b]` or `name[a%:b%]`, joined by `+`:
//!
//! ```
//! use ironshard::instruction::{AbsoluteInstruction, ReadInstruction};
//! use std::collections::HashMap;
//!
//! let ri: ReadInstruction = "train[-5%:] + val[40%:60%]".parse()?;
//! let lengths = HashMap::from([("train".to_string(), 200u64), ("val".to_string(), 50)]);
//! let abs = ri.to_absolute(&lengths)?;
//! assert_eq!(abs[0], AbsoluteInstruction::new("train", Some(190), None));
//! assert_eq!(abs[1], AbsoluteInstruction::new("val", Some(20), Some(30)));
//! # Ok::<(), ironshard::error::SliceError>(())
//! ```
//!
//! Resolution happens against split lengths only; nothing here touches the data.
//! Term order is preserved end to end and becomes the concatenation order of the
//! records that are eventually read.

use crate::error::{ErrorKind, SliceError, SliceResult};
use crate::utils::{div_round_half_even, div_trunc};
use indexmap::IndexMap;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use std::sync::LazyLock;

static TERM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<split>\w+)(\[((?P<from>-?\d+)(?P<from_pct>%)?)?:((?P<to>-?\d+)(?P<to_pct>%)?)?\])?$",
    )
    .expect("static term regex")
});

static ADDITION_SEP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\+\s*").expect("static separator regex"));

/// How percentage bounds become record offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Rounding {
    /// `round(pct * n / 100)`, exact halves go to the even neighbour.
    #[default]
    Closest,
    /// `trunc(pct * n / 100)`; refused on splits with fewer than 100 records.
    Pct1DropRemainder,
}

impl Rounding {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closest => "closest",
            Self::Pct1DropRemainder => "pct1_dropremainder",
        }
    }

    fn pct_to_abs(self, pct: i64, num_examples: u64) -> SliceResult<i128> {
        let scaled = i128::from(pct) * i128::from(num_examples);
        match self {
            Self::Closest => Ok(div_round_half_even(scaled, 100)),
            Self::Pct1DropRemainder => {
                if num_examples < 100 {
                    return Err(SliceError::insufficient(format!(
                        "using \"pct1_dropremainder\" rounding on a split with less than 100 \
                         examples is forbidden ({num_examples} available)"
                    )));
                }
                Ok(div_trunc(scaled, 100))
            }
        }
    }
}

impl Display for Rounding {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Rounding {
    type Err = SliceError;

    fn from_str(s: &str) -> SliceResult<Self> {
        match s {
            "closest" => Ok(Self::Closest),
            "pct1_dropremainder" => Ok(Self::Pct1DropRemainder),
            other => Err(SliceError::format(format!("unknown rounding `{other}`"))),
        }
    }
}

/// Unit of the bounds of one term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Unit {
    Percent,
    Absolute,
}

/// One term of a slice specification, before split lengths are known.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelativeInstruction {
    pub split: String,
    pub from: Option<i64>,
    pub to: Option<i64>,
    pub unit: Unit,
    pub rounding: Rounding,
}

impl RelativeInstruction {
    fn resolve(&self, lengths: &impl SplitLengths) -> SliceResult<AbsoluteInstruction> {
        let Some(num_examples) = lengths.split_len(&self.split) else {
            return Err(SliceError::new(
                ErrorKind::UnknownSplit,
                format!(
                    "unknown split \"{}\"; should be one of {:?}",
                    self.split,
                    lengths.split_names()
                ),
            ));
        };
        let n = i128::from(num_examples);
        let (from, to) = match self.unit {
            Unit::Percent => (
                self.from
                    .map_or(Ok(0), |p| self.rounding.pct_to_abs(p, num_examples))?,
                self.to
                    .map_or(Ok(n), |p| self.rounding.pct_to_abs(p, num_examples))?,
            ),
            Unit::Absolute => (
                self.from.map_or(0, i128::from),
                self.to.map_or(n, i128::from),
            ),
        };
        if from.abs() > n || to.abs() > n {
            return Err(SliceError::out_of_range(format!(
                "requested slice [{from}:{to}] incompatible with {num_examples} examples of \"{}\"",
                self.split
            )));
        }
        let from = if from < 0 { n + from } else { from };
        let to = if to < 0 { n + to } else { to };
        if from > to {
            return Err(SliceError::out_of_range(format!(
                "requested slice of \"{}\" resolves to the inverted range [{from}:{to}]",
                self.split
            )));
        }
        // Both bounds now lie in [0, n], so they fit a u64.
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let (from, to) = (from as u64, to as u64);
        Ok(AbsoluteInstruction {
            split: self.split.clone(),
            from: (from != 0).then_some(from),
            to: (to != num_examples).then_some(to),
        })
    }
}

impl Display for RelativeInstruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.split)?;
        if self.unit == Unit::Percent && self.from.is_none() && self.to.is_none() {
            return Ok(());
        }
        let pct = if self.unit == Unit::Percent { "%" } else { "" };
        f.write_str("[")?;
        if let Some(from) = self.from {
            write!(f, "{from}{pct}")?;
        }
        f.write_str(":")?;
        if let Some(to) = self.to {
            write!(f, "{to}{pct}")?;
        }
        f.write_str("]")
    }
}

/// An ordered, non-empty sequence of [`RelativeInstruction`]s sharing one rounding policy.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReadInstruction {
    terms: Vec<RelativeInstruction>,
}

impl ReadInstruction {
    /// The whole of `split`.
    pub fn new(split: impl Into<String>) -> Self {
        Self::slice(split, None, None, Unit::Percent)
    }

    /// `split[from:to]` in the given unit, with [`Rounding::Closest`].
    pub fn slice(split: impl Into<String>, from: Option<i64>, to: Option<i64>, unit: Unit) -> Self {
        Self {
            terms: vec![RelativeInstruction {
                split: split.into(),
                from,
                to,
                unit,
                rounding: Rounding::default(),
            }],
        }
    }

    /// Same instruction with every term switched to `rounding`.
    #[must_use]
    pub fn with_rounding(mut self, rounding: Rounding) -> Self {
        for term in &mut self.terms {
            term.rounding = rounding;
        }
        self
    }

    /// Parse a slice specification such as `test[:10%] + train[40%:60%]`.
    ///
    /// # Errors
    /// [`ErrorKind::Format`] for anything that is not a `+`-separated list of
    /// `name`, `name[a:b]` terms, or when one term mixes `%` and absolute bounds.
    pub fn from_spec(spec: &str) -> SliceResult<Self> {
        let spec = spec.trim();
        let mut terms = ADDITION_SEP_RE.split(spec).map(parse_term);
        let first = terms
            .next()
            .ok_or_else(|| SliceError::format(format!("no instructions in `{spec}`")))??;
        terms.try_fold(first, |acc, term| acc.try_add(term?))
    }

    /// Concatenate two instructions.
    ///
    /// # Errors
    /// [`ErrorKind::RoundingMismatch`] when the two instructions use different rounding.
    pub fn try_add(mut self, other: Self) -> SliceResult<Self> {
        if self.rounding() != other.rounding() {
            return Err(SliceError::new(
                ErrorKind::RoundingMismatch,
                format!(
                    "cannot add instructions with different rounding ({} vs {})",
                    self.rounding(),
                    other.rounding()
                ),
            ));
        }
        self.terms.extend(other.terms);
        Ok(self)
    }

    /// Rounding policy of the instruction, represented by its first term.
    #[must_use]
    pub fn rounding(&self) -> Rounding {
        self.terms[0].rounding
    }

    #[must_use]
    pub fn terms(&self) -> &[RelativeInstruction] {
        &self.terms
    }

    /// Resolve every term against the split lengths, keeping term order.
    ///
    /// # Errors
    /// [`ErrorKind::UnknownSplit`], [`ErrorKind::OutOfRange`] or
    /// [`ErrorKind::InsufficientExamples`] from the first failing term.
    pub fn to_absolute(
        &self,
        lengths: &impl SplitLengths,
    ) -> SliceResult<Vec<AbsoluteInstruction>> {
        self.terms.iter().map(|t| t.resolve(lengths)).collect()
    }
}

impl Display for ReadInstruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, term) in self.terms.iter().enumerate() {
            if i > 0 {
                f.write_str("+")?;
            }
            write!(f, "{term}")?;
        }
        Ok(())
    }
}

impl FromStr for ReadInstruction {
    type Err = SliceError;

    fn from_str(s: &str) -> SliceResult<Self> {
        Self::from_spec(s)
    }
}

impl TryFrom<&str> for ReadInstruction {
    type Error = SliceError;

    fn try_from(s: &str) -> SliceResult<Self> {
        Self::from_spec(s)
    }
}

fn parse_bound(raw: Option<regex::Match<'_>>, spec: &str) -> SliceResult<Option<i64>> {
    raw.map(|m| {
        m.as_str()
            .parse::<i64>()
            .map_err(|e| SliceError::format(format!("bad bound `{}` in `{spec}`: {e}", m.as_str())))
    })
    .transpose()
}

fn parse_term(spec: &str) -> SliceResult<ReadInstruction> {
    let caps = TERM_RE
        .captures(spec)
        .ok_or_else(|| SliceError::format(format!("unrecognized instruction format: `{spec}`")))?;
    let from = parse_bound(caps.name("from"), spec)?;
    let to = parse_bound(caps.name("to"), spec)?;
    let from_pct = caps.name("from_pct").is_some();
    let to_pct = caps.name("to_pct").is_some();
    if from.is_some() && to.is_some() && from_pct != to_pct {
        return Err(SliceError::format(format!(
            "mixed percent and absolute bounds in `{spec}`"
        )));
    }
    let unit = if from_pct || to_pct || caps.get(2).is_none() {
        Unit::Percent
    } else {
        Unit::Absolute
    };
    Ok(ReadInstruction::slice(&caps["split"], from, to, unit))
}

/// A resolved slice of one split: `[from, to)` with `None` meaning "start" / "end".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AbsoluteInstruction {
    pub split: String,
    pub from: Option<u64>,
    pub to: Option<u64>,
}

impl AbsoluteInstruction {
    pub fn new(split: impl Into<String>, from: Option<u64>, to: Option<u64>) -> Self {
        Self {
            split: split.into(),
            from,
            to,
        }
    }

    /// Concrete `[from, to)` for a split of `num_examples` records.
    #[must_use]
    pub fn bounds(&self, num_examples: u64) -> (u64, u64) {
        (self.from.unwrap_or(0), self.to.unwrap_or(num_examples))
    }

    /// Number of records selected from a split of `num_examples` records.
    #[must_use]
    pub fn num_examples(&self, num_examples: u64) -> u64 {
        let (from, to) = self.bounds(num_examples);
        to.saturating_sub(from)
    }
}

impl Display for AbsoluteInstruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}[", self.split)?;
        if let Some(from) = self.from {
            write!(f, "{from}")?;
        }
        f.write_str(":")?;
        if let Some(to) = self.to {
            write!(f, "{to}")?;
        }
        f.write_str("]")
    }
}

/// Anything that can answer "how many records does this split hold".
pub trait SplitLengths {
    fn split_len(&self, split: &str) -> Option<u64>;
    fn split_names(&self) -> Vec<&str>;
}

impl SplitLengths for HashMap<String, u64> {
    fn split_len(&self, split: &str) -> Option<u64> {
        self.get(split).copied()
    }

    fn split_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl SplitLengths for BTreeMap<String, u64> {
    fn split_len(&self, split: &str) -> Option<u64> {
        self.get(split).copied()
    }

    fn split_names(&self) -> Vec<&str> {
        self.keys().map(String::as_str).collect()
    }
}

impl SplitLengths for IndexMap<String, u64> {
    fn split_len(&self, split: &str) -> Option<u64> {
        self.get(split).copied()
    }

    fn split_names(&self) -> Vec<&str> {
        self.keys().map(String::as_str).collect()
    }
}
