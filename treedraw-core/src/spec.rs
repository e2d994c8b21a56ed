//! Parsing of textual histogram requests such as `pt(50,0,10)=sqrt(px*px+py*py) if q>0`.

use std::{fmt, str::FromStr};

use crate::{
    error::{ConfigurationError, SpecDefect},
    expr::Expression,
    histogram::{Axis, Binning, MAX_CELLS},
};

/// One requested histogram: a name, one or two coordinate expressions, an
/// optional cut and the binning.
///
/// # Examples
/// ```
/// use treedraw_core::{Binning, HistogramSpec};
///
/// let spec: HistogramSpec = "pxpy=px:py if abs(px) < 5".parse()?;
/// assert_eq!(spec.name(), "pxpy");
/// assert_eq!(spec.dimension(), 2);
/// assert_eq!(spec.x().source(), "px");
/// assert_eq!(spec.cut().map(|cut| cut.source()), Some("abs(px) < 5"));
/// assert_eq!(spec.binning(), Binning::auto(2));
/// # Ok::<(), treedraw_core::ConfigurationError>(())
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct HistogramSpec {
    text: String,
    name: String,
    x: Expression,
    y: Option<Expression>,
    cut: Option<Expression>,
    binning: Binning,
}

impl HistogramSpec {
    /// Parses `NAME[(NX,XLO,XHI[,NY,YLO,YHI])]=EXPR[:EXPR][ if CUT]`.
    ///
    /// # Errors
    /// Returns [`ConfigurationError::MalformedSpec`] when the spec structure is
    /// wrong and [`ConfigurationError::InvalidExpression`] when an expression
    /// or the cut does not parse.
    pub fn parse(text: &str) -> Result<Self, ConfigurationError> {
        let text = text.trim();
        let malformed = |defect| ConfigurationError::MalformedSpec {
            spec: text.to_owned(),
            defect,
        };

        let (head, body) = text
            .split_once('=')
            .ok_or_else(|| malformed(SpecDefect::MissingEquals))?;
        let (name, axes) = split_binning(head.trim()).map_err(malformed)?;
        if name.is_empty() {
            return Err(malformed(SpecDefect::EmptyName));
        }
        if name.chars().any(char::is_whitespace) {
            return Err(malformed(SpecDefect::InvalidName {
                name: name.to_owned(),
            }));
        }

        let (fields, cut) = match find_cut_keyword(body) {
            Some(at) => {
                let cut = body[at + 2..].trim();
                if cut.is_empty() {
                    return Err(malformed(SpecDefect::EmptyCut));
                }
                (&body[..at], Some(cut))
            }
            None => (body, None),
        };
        if fields.trim().is_empty() {
            return Err(malformed(SpecDefect::EmptyExpression));
        }

        let fields: Vec<&str> = fields.split(':').map(str::trim).collect();
        if fields.len() > 2 {
            return Err(malformed(SpecDefect::TooManyDimensions {
                found: fields.len(),
            }));
        }
        if let Some(position) = fields.iter().position(|field| field.is_empty()) {
            return Err(malformed(SpecDefect::EmptyField {
                field: position + 1,
            }));
        }
        let dimension = fields.len() as u8;
        let binning = match axes {
            Some(numbers) => fixed_binning(&numbers, dimension).map_err(malformed)?,
            None => Binning::auto(dimension),
        };

        let x = parse_expression(fields[0])?;
        let y = fields.get(1).copied().map(parse_expression).transpose()?;
        let cut = cut.map(parse_expression).transpose()?;

        Ok(Self {
            text: text.to_owned(),
            name: name.to_owned(),
            x,
            y,
            cut,
            binning,
        })
    }

    /// Histogram name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The x coordinate expression.
    #[must_use]
    pub fn x(&self) -> &Expression {
        &self.x
    }

    /// The y coordinate expression of a 2-D spec.
    #[must_use]
    pub fn y(&self) -> Option<&Expression> {
        self.y.as_ref()
    }

    /// The cut, if any.
    #[must_use]
    pub fn cut(&self) -> Option<&Expression> {
        self.cut.as_ref()
    }

    /// How the axes are chosen.
    #[must_use]
    pub fn binning(&self) -> Binning {
        self.binning
    }

    /// 1 or 2.
    #[must_use]
    pub fn dimension(&self) -> u8 {
        if self.y.is_some() { 2 } else { 1 }
    }

    /// Distinct branches read by the expressions and the cut, in order of
    /// first use.
    #[must_use]
    pub fn branches(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        let expressions = std::iter::once(&self.x).chain(self.y.iter()).chain(self.cut.iter());
        for name in expressions.flat_map(Expression::branches) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }
}

impl FromStr for HistogramSpec {
    type Err = ConfigurationError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Self::parse(text)
    }
}

impl fmt::Display for HistogramSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

fn parse_expression(source: &str) -> Result<Expression, ConfigurationError> {
    Expression::parse(source).map_err(|source_err| ConfigurationError::InvalidExpression {
        expression: source.to_owned(),
        source: source_err,
    })
}

/// Byte offset of the first standalone `if` in `body`.
fn find_cut_keyword(body: &str) -> Option<usize> {
    let bytes = body.as_bytes();
    body.match_indices("if").map(|(at, _)| at).find(|&at| {
        let before = at.checked_sub(1).map(|index| bytes[index]);
        let after = bytes.get(at + 2).copied();
        let starts_word = before.is_none_or(|byte| byte.is_ascii_whitespace());
        let ends_word = after.is_none_or(|byte| byte.is_ascii_whitespace() || byte == b'(');
        starts_word && ends_word
    })
}

/// Splits `name(n,lo,hi,...)` into the bare name and its numbers.
fn split_binning(head: &str) -> Result<(&str, Option<Vec<&str>>), SpecDefect> {
    let Some(open) = head.find('(') else {
        return Ok((head, None));
    };
    let inner = head[open + 1..]
        .strip_suffix(')')
        .ok_or_else(|| SpecDefect::InvalidBinning {
            reason: "binning must end with `)`".to_owned(),
        })?;
    let numbers = inner.split(',').map(str::trim).collect();
    Ok((head[..open].trim(), Some(numbers)))
}

fn fixed_binning(numbers: &[&str], dimension: u8) -> Result<Binning, SpecDefect> {
    let expected = 3 * usize::from(dimension);
    if numbers.len() != expected {
        return Err(SpecDefect::InvalidBinning {
            reason: format!(
                "a {dimension}-D histogram needs {expected} binning values, found {}",
                numbers.len()
            ),
        });
    }
    let x = parse_axis(&numbers[..3])?;
    let y = if dimension == 2 {
        Some(parse_axis(&numbers[3..])?)
    } else {
        None
    };
    let cells = y.map_or(Some(x.cells()), |y| x.cells().checked_mul(y.cells()));
    if cells.is_none_or(|cells| cells > MAX_CELLS) {
        return Err(SpecDefect::InvalidBinning {
            reason: format!("binning needs more than {MAX_CELLS} cells"),
        });
    }
    Ok(Binning::Fixed { x, y })
}

fn parse_axis(numbers: &[&str]) -> Result<Axis, SpecDefect> {
    let invalid = |reason: String| SpecDefect::InvalidBinning { reason };
    let [bins, low, high] = numbers else {
        return Err(invalid("an axis takes three values".to_owned()));
    };
    let bins: u32 = bins
        .parse()
        .map_err(|_| invalid(format!("`{bins}` is not a bin count")))?;
    let low: f64 = low
        .parse()
        .map_err(|_| invalid(format!("`{low}` is not a number")))?;
    let high: f64 = high
        .parse()
        .map_err(|_| invalid(format!("`{high}` is not a number")))?;
    Axis::new(bins, low, high).map_err(|err| invalid(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;

    use crate::histogram::{DEFAULT_BINS_1D, DEFAULT_BINS_2D};

    fn defect_of(text: &str) -> SpecDefect {
        match HistogramSpec::parse(text) {
            Err(ConfigurationError::MalformedSpec { defect, .. }) => defect,
            other => panic!("expected a malformed spec, got {other:?}"),
        }
    }

    #[rstest]
    fn parses_one_dimensional_spec() {
        let spec = HistogramSpec::parse("  pt = sqrt(px*px + py*py)  ").expect("valid spec");
        assert_eq!(spec.name(), "pt");
        assert_eq!(spec.dimension(), 1);
        assert_eq!(spec.x().source(), "sqrt(px*px + py*py)");
        assert!(spec.cut().is_none());
        assert_eq!(
            spec.binning(),
            Binning::Auto {
                x_bins: DEFAULT_BINS_1D,
                y_bins: None
            }
        );
        assert_eq!(spec.to_string(), "pt = sqrt(px*px + py*py)");
        assert_eq!(spec.branches(), ["px", "py"]);
    }

    #[rstest]
    fn first_field_is_x_axis() {
        let spec = HistogramSpec::parse("h=px:py").expect("valid spec");
        assert_eq!(spec.x().source(), "px");
        assert_eq!(spec.y().map(Expression::source), Some("py"));
        assert_eq!(
            spec.binning(),
            Binning::Auto {
                x_bins: DEFAULT_BINS_2D,
                y_bins: Some(DEFAULT_BINS_2D)
            }
        );
    }

    #[rstest]
    #[case("h=px if px > 0", "px", "px > 0")]
    #[case("h=px if(px > 0)", "px", "(px > 0)")]
    #[case("h=diff if shift > 0", "diff", "shift > 0")]
    #[case("h=px if cut_if", "px", "cut_if")]
    fn cut_starts_at_standalone_if(#[case] text: &str, #[case] x: &str, #[case] cut: &str) {
        let spec = HistogramSpec::parse(text).expect("valid spec");
        assert_eq!(spec.x().source(), x);
        assert_eq!(spec.cut().map(Expression::source), Some(cut));
    }

    #[rstest]
    fn branches_merge_expression_and_cut() {
        let spec = HistogramSpec::parse("h=px:py if px > e").expect("valid spec");
        assert_eq!(spec.branches(), ["px", "py", "e"]);
    }

    #[rstest]
    fn explicit_binning_is_applied() {
        let spec = HistogramSpec::parse("h(10, 0, 5, 4, -1, 1)=px:py").expect("valid spec");
        assert_eq!(spec.name(), "h");
        let Binning::Fixed { x, y } = spec.binning() else {
            panic!("binning must be fixed");
        };
        assert_eq!((x.bins(), x.low(), x.high()), (10, 0.0, 5.0));
        let y = y.expect("2-D binning has a y axis");
        assert_eq!((y.bins(), y.low(), y.high()), (4, -1.0, 1.0));
    }

    #[rstest]
    #[case("h px", SpecDefect::MissingEquals)]
    #[case(" =px", SpecDefect::EmptyName)]
    #[case("my hist=px", SpecDefect::InvalidName { name: "my hist".to_owned() })]
    #[case("h=", SpecDefect::EmptyExpression)]
    #[case("h= if px > 0", SpecDefect::EmptyExpression)]
    #[case("h=px if ", SpecDefect::EmptyCut)]
    #[case("h=px:", SpecDefect::EmptyField { field: 2 })]
    #[case("h=:py", SpecDefect::EmptyField { field: 1 })]
    #[case("h=a:b:c", SpecDefect::TooManyDimensions { found: 3 })]
    fn rejects_malformed_specs(#[case] text: &str, #[case] expected: SpecDefect) {
        assert_eq!(defect_of(text), expected);
    }

    #[rstest]
    #[case("h(10,0)=px")]
    #[case("h(10,0,1,5,0,1)=px")]
    #[case("h(0,0,1)=px")]
    #[case("h(10,1,0)=px")]
    #[case("h(ten,0,1)=px")]
    #[case("h(10,0,1=px")]
    #[case("h(4000000000,0,1)=px")]
    #[case("h(5000,0,1,5000,0,1)=px:py")]
    fn rejects_bad_binning(#[case] text: &str) {
        assert!(matches!(defect_of(text), SpecDefect::InvalidBinning { .. }));
    }

    #[rstest]
    fn expression_errors_are_reported_separately() {
        let err = HistogramSpec::parse("h=px + * py").expect_err("expression is invalid");
        assert_eq!(err.code().as_str(), "CONFIG_INVALID_EXPRESSION");
        assert!(matches!(
            err,
            ConfigurationError::InvalidExpression { ref expression, .. } if expression == "px + * py"
        ));
    }
}
