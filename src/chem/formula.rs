//! Chemical formula parsing.
//!
//! Accepts element symbols with optional integer or decimal amounts and
//! nested `(...)` / `[...]` groups with multipliers, e.g. `Fe2O3`,
//! `Ca3(PO4)2`, `Li0.5CoO2`. Whitespace and `·` separators are ignored.

use std::fmt;

use thiserror::Error;

use crate::chem::elements::{atomic_number, atomic_weight, is_element, ELEMENTS};
use crate::utils::math::gcd;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormulaError {
    #[error("Formula is empty.")]
    Empty,
    #[error("Unknown element '{0}'.")]
    UnknownElement(String),
    #[error("Unexpected character '{0}' at position {1}.")]
    UnexpectedChar(char, usize),
    #[error("Unbalanced brackets.")]
    Unbalanced,
    #[error("Invalid amount '{0}'.")]
    InvalidAmount(String),
    #[error("Brackets nested deeper than {MAX_NESTING} levels.")]
    TooDeep,
}

/// Element amounts in order of first appearance.
#[derive(Debug, Clone, PartialEq)]
pub struct Composition {
    amounts: Vec<(String, f64)>,
}

const AMOUNT_TOLERANCE: f64 = 1e-8;

/// Deepest bracket nesting the parser accepts.
pub const MAX_NESTING: usize = 32;

impl Composition {
    pub fn parse(formula: &str) -> Result<Self, FormulaError> {
        let chars: Vec<char> = formula
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '·' && *c != '*')
            .collect();
        if chars.is_empty() {
            return Err(FormulaError::Empty);
        }
        let mut pos = 0;
        let amounts = parse_group(&chars, &mut pos, None, 0)?;
        if pos != chars.len() {
            return Err(FormulaError::Unbalanced);
        }
        let mut comp = Self { amounts: Vec::new() };
        for (el, n) in amounts {
            comp.add(&el, n);
        }
        comp.amounts.retain(|(_, n)| *n > AMOUNT_TOLERANCE);
        if comp.amounts.is_empty() {
            return Err(FormulaError::Empty);
        }
        Ok(comp)
    }

    /// Build from explicit `(element, amount)` pairs, merging repeats.
    pub fn from_amounts<'a, I>(amounts: I) -> Result<Self, FormulaError>
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        let mut comp = Self { amounts: Vec::new() };
        for (el, n) in amounts {
            if !is_element(el) {
                return Err(FormulaError::UnknownElement(el.to_string()));
            }
            comp.add(el, n);
        }
        comp.amounts.retain(|(_, n)| *n > AMOUNT_TOLERANCE);
        if comp.amounts.is_empty() {
            return Err(FormulaError::Empty);
        }
        Ok(comp)
    }

    fn add(&mut self, element: &str, n: f64) {
        match self.amounts.iter_mut().find(|(el, _)| el == element) {
            Some((_, total)) => *total += n,
            None => self.amounts.push((element.to_string(), n)),
        }
    }

    pub fn amounts(&self) -> &[(String, f64)] {
        &self.amounts
    }

    pub fn num_atoms(&self) -> f64 {
        self.amounts.iter().map(|(_, n)| n).sum()
    }

    /// Sorted, de-duplicated element symbols.
    pub fn elements(&self) -> Vec<String> {
        let mut els: Vec<String> = self.amounts.iter().map(|(e, _)| e.clone()).collect();
        els.sort();
        els
    }

    /// Molar mass in g/mol.
    pub fn weight(&self) -> f64 {
        self.amounts
            .iter()
            .map(|(el, n)| atomic_weight(el).unwrap_or(0.0) * n)
            .sum()
    }

    /// Space-separated full formula, e.g. `Fe4 O6`.
    pub fn formula(&self) -> String {
        self.amounts
            .iter()
            .map(|(el, n)| format!("{}{}", el, format_amount(*n)))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Formula divided by the gcd of its amounts when they are all integral,
    /// e.g. `Fe4O6` becomes `Fe2O3`. Non-integral compositions are kept as is.
    pub fn reduced_formula(&self) -> String {
        let integral: Option<Vec<u64>> = self
            .amounts
            .iter()
            .map(|(_, n)| {
                let r = n.round();
                ((n - r).abs() < AMOUNT_TOLERANCE && r >= 1.0).then_some(r as u64)
            })
            .collect();
        let divisor = integral
            .map(|ns| ns.into_iter().fold(0, gcd).max(1))
            .unwrap_or(1) as f64;
        self.amounts
            .iter()
            .map(|(el, n)| {
                let amount = n / divisor;
                if (amount - 1.0).abs() < AMOUNT_TOLERANCE {
                    el.clone()
                } else {
                    format!("{}{}", el, format_amount(amount))
                }
            })
            .collect()
    }

    /// Atomic fraction per element, indexed by atomic number - 1.
    pub fn fraction_vector(&self) -> Vec<f64> {
        let total = self.num_atoms();
        let mut v = vec![0.0; ELEMENTS.len()];
        if total <= 0.0 {
            return v;
        }
        for (el, n) in &self.amounts {
            if let Some(z) = atomic_number(el) {
                v[z - 1] = n / total;
            }
        }
        v
    }
}

impl fmt::Display for Composition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.formula())
    }
}

fn format_amount(n: f64) -> String {
    if (n - n.round()).abs() < AMOUNT_TOLERANCE {
        format!("{}", n.round() as i64)
    } else {
        let s = format!("{:.4}", n);
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

fn parse_group(
    chars: &[char],
    pos: &mut usize,
    closer: Option<char>,
    depth: usize,
) -> Result<Vec<(String, f64)>, FormulaError> {
    let mut out: Vec<(String, f64)> = Vec::new();
    while *pos < chars.len() {
        let c = chars[*pos];
        match c {
            '(' | '[' => {
                if depth >= MAX_NESTING {
                    return Err(FormulaError::TooDeep);
                }
                let close = if c == '(' { ')' } else { ']' };
                *pos += 1;
                let inner = parse_group(chars, pos, Some(close), depth + 1)?;
                let mult = parse_amount(chars, pos)?.unwrap_or(1.0);
                out.extend(inner.into_iter().map(|(el, n)| (el, n * mult)));
            }
            ')' | ']' => {
                if closer == Some(c) {
                    *pos += 1;
                    return Ok(out);
                }
                return Err(FormulaError::Unbalanced);
            }
            c if c.is_ascii_uppercase() => {
                let mut symbol = c.to_string();
                *pos += 1;
                if *pos < chars.len() && chars[*pos].is_ascii_lowercase() {
                    symbol.push(chars[*pos]);
                    *pos += 1;
                }
                if !is_element(&symbol) {
                    return Err(FormulaError::UnknownElement(symbol));
                }
                let n = parse_amount(chars, pos)?.unwrap_or(1.0);
                out.push((symbol, n));
            }
            other => return Err(FormulaError::UnexpectedChar(other, *pos)),
        }
    }
    if closer.is_some() {
        return Err(FormulaError::Unbalanced);
    }
    Ok(out)
}

fn parse_amount(chars: &[char], pos: &mut usize) -> Result<Option<f64>, FormulaError> {
    let start = *pos;
    while *pos < chars.len() && (chars[*pos].is_ascii_digit() || chars[*pos] == '.') {
        *pos += 1;
    }
    if start == *pos {
        return Ok(None);
    }
    let text: String = chars[start..*pos].iter().collect();
    text.parse::<f64>()
        .map(Some)
        .map_err(|_| FormulaError::InvalidAmount(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_formula() {
        let c = Composition::parse("Fe2O3").unwrap();
        assert_eq!(c.amounts(), &[("Fe".to_string(), 2.0), ("O".to_string(), 3.0)]);
        assert_eq!(c.formula(), "Fe2 O3");
        assert_eq!(c.reduced_formula(), "Fe2O3");
        assert_eq!(c.elements(), vec!["Fe", "O"]);
    }

    #[test]
    fn test_groups_and_reduction() {
        let c = Composition::parse("Ca3(PO4)2").unwrap();
        assert_eq!(c.formula(), "Ca3 P2 O8");
        let c = Composition::parse("Fe4O6").unwrap();
        assert_eq!(c.reduced_formula(), "Fe2O3");
        let c = Composition::parse("[Co(NH3)6]Cl3").unwrap();
        assert_eq!(c.formula(), "Co1 N6 H18 Cl3");
    }

    #[test]
    fn test_repeated_elements_merge() {
        let c = Composition::parse("HOH").unwrap();
        assert_eq!(c.reduced_formula(), "H2O");
    }

    #[test]
    fn test_fractional_amounts() {
        let c = Composition::parse("Li0.5CoO2").unwrap();
        assert_eq!(c.formula(), "Li0.5 Co1 O2");
        assert_eq!(c.reduced_formula(), "Li0.5CoO2");
    }

    #[test]
    fn test_invalid_formulas() {
        assert_eq!(Composition::parse(""), Err(FormulaError::Empty));
        assert_eq!(Composition::parse("   "), Err(FormulaError::Empty));
        assert_eq!(
            Composition::parse("Xx2"),
            Err(FormulaError::UnknownElement("Xx".into()))
        );
        assert_eq!(Composition::parse("Fe2(O3"), Err(FormulaError::Unbalanced));
        assert_eq!(Composition::parse("Fe2)O3"), Err(FormulaError::Unbalanced));
        let deep = format!("{}Fe{}", "(".repeat(400_000), ")".repeat(400_000));
        assert_eq!(Composition::parse(&deep), Err(FormulaError::TooDeep));
        let ok = format!("{}Fe{}", "(".repeat(MAX_NESTING), ")".repeat(MAX_NESTING));
        assert_eq!(Composition::parse(&ok).unwrap().reduced_formula(), "Fe");
        assert!(matches!(
            Composition::parse("fe2o3"),
            Err(FormulaError::UnexpectedChar('f', 0))
        ));
        assert!(matches!(
            Composition::parse("Fe1.2.3"),
            Err(FormulaError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_fraction_vector_sums_to_one() {
        let c = Composition::parse("Fe2O3").unwrap();
        let v = c.fraction_vector();
        assert!((v.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!((v[25] - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_weight() {
        let c = Composition::parse("H2O").unwrap();
        assert!((c.weight() - 18.015).abs() < 0.01);
    }
}
