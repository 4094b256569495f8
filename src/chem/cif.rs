//! Minimal CIF reader.
//!
//! Reads the first `data_` block: cell parameters, the `_atom_site_*` loop and
//! the symmetry operations, then expands the asymmetric unit into the full
//! cell. Anything else in the file is ignored.

use std::collections::HashMap;

use serde::Serialize;
use thiserror::Error;

use crate::chem::elements::is_element;
use crate::chem::formula::{Composition, FormulaError};

/// g/mol per Å^3 to g/cm^3.
const AMU_PER_A3_TO_G_PER_CM3: f64 = 1.660_539_066_60;

/// Fractional-coordinate tolerance used for wrapping and site de-duplication.
const SITE_TOLERANCE: f64 = 1e-4;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CifError {
    #[error("CIF text is empty.")]
    Empty,
    #[error("No data_ block found.")]
    NoDataBlock,
    #[error("Missing required tag {0}.")]
    MissingTag(&'static str),
    #[error("Invalid number '{value}' for {tag}.")]
    InvalidNumber { tag: String, value: String },
    #[error("Unterminated {0}.")]
    Unterminated(&'static str),
    #[error("Invalid lattice parameters.")]
    InvalidLattice,
    #[error("Structure has no atom sites.")]
    NoSites,
    #[error("Unrecognised element in site '{0}'.")]
    UnknownElement(String),
    #[error("Invalid symmetry operation '{0}'.")]
    InvalidSymmetryOp(String),
    #[error("Loop for {0} has a ragged value table.")]
    RaggedLoop(String),
    #[error(transparent)]
    Formula(#[from] FormulaError),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Lattice {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
}

impl Lattice {
    pub fn new(a: f64, b: f64, c: f64, alpha: f64, beta: f64, gamma: f64) -> Result<Self, CifError> {
        let lattice = Self { a, b, c, alpha, beta, gamma };
        let lengths_ok = [a, b, c].iter().all(|l| l.is_finite() && *l > 0.0);
        let angles_ok = [alpha, beta, gamma]
            .iter()
            .all(|t| t.is_finite() && *t > 0.0 && *t < 180.0);
        if !lengths_ok || !angles_ok || lattice.volume_factor() <= 0.0 {
            return Err(CifError::InvalidLattice);
        }
        Ok(lattice)
    }

    fn volume_factor(&self) -> f64 {
        let (ca, cb, cg) = (
            self.alpha.to_radians().cos(),
            self.beta.to_radians().cos(),
            self.gamma.to_radians().cos(),
        );
        1.0 - ca * ca - cb * cb - cg * cg + 2.0 * ca * cb * cg
    }

    /// Cell volume in Å^3.
    pub fn volume(&self) -> f64 {
        self.a * self.b * self.c * self.volume_factor().sqrt()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Site {
    pub element: String,
    pub frac_coords: [f64; 3],
    pub occupancy: f64,
}

impl Site {
    /// `Fe` when fully occupied, `Fe:0.500` otherwise.
    pub fn species_string(&self) -> String {
        if (self.occupancy - 1.0).abs() < 1e-6 {
            self.element.clone()
        } else {
            format!("{}:{:.3}", self.element, self.occupancy)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Structure {
    lattice: Lattice,
    sites: Vec<Site>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatticeSummary {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteSummary {
    pub element: String,
    pub frac_coords: [f64; 3],
}

/// Structure metadata returned by the CIF tools.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructureSummary {
    pub formula: String,
    pub reduced_formula: String,
    pub density: f64,
    pub num_sites: usize,
    pub lattice: LatticeSummary,
    pub elements: Vec<String>,
    pub sites: Vec<SiteSummary>,
}

impl Structure {
    pub fn new(lattice: Lattice, sites: Vec<Site>) -> Result<Self, CifError> {
        if sites.is_empty() {
            return Err(CifError::NoSites);
        }
        Ok(Self { lattice, sites })
    }

    pub fn from_cif(text: &str) -> Result<Self, CifError> {
        if text.trim().is_empty() {
            return Err(CifError::Empty);
        }
        let block = DataBlock::parse(text)?;

        let lattice = Lattice::new(
            block.number("_cell_length_a")?,
            block.number("_cell_length_b")?,
            block.number("_cell_length_c")?,
            block.number("_cell_angle_alpha")?,
            block.number("_cell_angle_beta")?,
            block.number("_cell_angle_gamma")?,
        )?;

        let ops = block.symmetry_ops()?;
        let asymmetric = block.atom_sites()?;
        Self::new(lattice, expand_sites(&asymmetric, &ops))
    }

    pub fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    pub fn sites(&self) -> &[Site] {
        &self.sites
    }

    pub fn composition(&self) -> Result<Composition, CifError> {
        Ok(Composition::from_amounts(
            self.sites.iter().map(|s| (s.element.as_str(), s.occupancy)),
        )?)
    }

    /// Density in g/cm^3.
    pub fn density(&self) -> Result<f64, CifError> {
        Ok(self.composition()?.weight() * AMU_PER_A3_TO_G_PER_CM3 / self.lattice.volume())
    }

    pub fn summary(&self) -> Result<StructureSummary, CifError> {
        let composition = self.composition()?;
        let mut sites: Vec<SiteSummary> = self
            .sites
            .iter()
            .map(|s| SiteSummary {
                element: s.species_string(),
                frac_coords: s.frac_coords,
            })
            .collect();
        sites.sort_by(|x, y| {
            x.element.cmp(&y.element).then_with(|| {
                x.frac_coords
                    .iter()
                    .zip(y.frac_coords.iter())
                    .map(|(a, b)| a.total_cmp(b))
                    .find(|o| o.is_ne())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
        });

        let l = self.lattice;
        Ok(StructureSummary {
            formula: composition.formula(),
            reduced_formula: composition.reduced_formula(),
            density: self.density()?,
            num_sites: self.sites.len(),
            lattice: LatticeSummary {
                a: l.a,
                b: l.b,
                c: l.c,
                alpha: l.alpha,
                beta: l.beta,
                gamma: l.gamma,
                volume: l.volume(),
            },
            elements: composition.elements(),
            sites,
        })
    }
}

fn expand_sites(asymmetric: &[Site], ops: &[SymmetryOp]) -> Vec<Site> {
    let mut out: Vec<Site> = Vec::new();
    for site in asymmetric {
        for op in ops {
            let coords = op.apply(site.frac_coords).map(wrap_unit);
            let duplicate = out
                .iter()
                .any(|s| s.element == site.element && same_position(s.frac_coords, coords));
            if !duplicate {
                out.push(Site {
                    element: site.element.clone(),
                    frac_coords: coords,
                    occupancy: site.occupancy,
                });
            }
        }
    }
    out
}

fn wrap_unit(x: f64) -> f64 {
    let w = x.rem_euclid(1.0);
    if (1.0 - w) < SITE_TOLERANCE || w < SITE_TOLERANCE {
        0.0
    } else {
        w
    }
}

fn same_position(a: [f64; 3], b: [f64; 3]) -> bool {
    a.iter().zip(b.iter()).all(|(x, y)| {
        let d = (x - y).abs();
        d.min(1.0 - d) < SITE_TOLERANCE
    })
}

/// One `x,y,z`-style operation: rotation rows plus translation.
#[derive(Debug, Clone, PartialEq)]
struct SymmetryOp {
    rows: [[f64; 3]; 3],
    shift: [f64; 3],
}

impl SymmetryOp {
    fn identity() -> Self {
        Self {
            rows: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            shift: [0.0; 3],
        }
    }

    fn parse(text: &str) -> Result<Self, CifError> {
        let bad = || CifError::InvalidSymmetryOp(text.to_string());
        let cleaned: String = text
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '\'' && *c != '"')
            .collect::<String>()
            .to_ascii_lowercase();
        let parts: Vec<&str> = cleaned.split(',').collect();
        if parts.len() != 3 {
            return Err(bad());
        }
        let mut op = Self {
            rows: [[0.0; 3]; 3],
            shift: [0.0; 3],
        };
        for (i, part) in parts.iter().enumerate() {
            let (row, shift) = parse_component(part).ok_or_else(bad)?;
            op.rows[i] = row;
            op.shift[i] = shift;
        }
        Ok(op)
    }

    fn apply(&self, f: [f64; 3]) -> [f64; 3] {
        let mut out = [0.0; 3];
        for (i, row) in self.rows.iter().enumerate() {
            out[i] = row[0] * f[0] + row[1] * f[1] + row[2] * f[2] + self.shift[i];
        }
        out
    }
}

fn parse_component(expr: &str) -> Option<([f64; 3], f64)> {
    if expr.is_empty() {
        return None;
    }
    let mut row = [0.0; 3];
    let mut shift = 0.0;
    let mut terms: Vec<(f64, String)> = Vec::new();
    let mut sign = 1.0;
    let mut current = String::new();
    for c in expr.chars() {
        match c {
            '+' | '-' => {
                if !current.is_empty() {
                    terms.push((sign, std::mem::take(&mut current)));
                }
                sign = if c == '-' { -1.0 } else { 1.0 };
            }
            _ => current.push(c),
        }
    }
    if current.is_empty() {
        return None;
    }
    terms.push((sign, current));

    for (sign, term) in terms {
        let axis = match term.chars().last() {
            Some('x') => Some(0),
            Some('y') => Some(1),
            Some('z') => Some(2),
            _ => None,
        };
        match axis {
            Some(i) => {
                let coeff = term[..term.len() - 1].trim_end_matches('*');
                let value = if coeff.is_empty() {
                    1.0
                } else {
                    parse_fraction(coeff)?
                };
                row[i] += sign * value;
            }
            None => shift += sign * parse_fraction(&term)?,
        }
    }
    Some((row, shift))
}

fn parse_fraction(s: &str) -> Option<f64> {
    match s.split_once('/') {
        Some((n, d)) => {
            let d: f64 = d.parse().ok()?;
            (d != 0.0).then_some(n.parse::<f64>().ok()? / d)
        }
        None => s.parse().ok(),
    }
}

/// `3.0(2)` -> `3.0`; `?` and `.` are unknown values.
fn parse_number(tag: &str, raw: &str) -> Result<f64, CifError> {
    let trimmed = raw.split('(').next().unwrap_or(raw).trim();
    trimmed.parse::<f64>().map_err(|_| CifError::InvalidNumber {
        tag: tag.to_string(),
        value: raw.to_string(),
    })
}

/// `Fe2+` -> `Fe`, `O1` -> `O`.
fn element_from_symbol(raw: &str) -> Option<String> {
    let mut chars = raw.chars().skip_while(|c| !c.is_ascii_alphabetic());
    let first = chars.next()?.to_ascii_uppercase();
    if let Some(second) = chars.next().filter(|c| c.is_ascii_lowercase()) {
        let candidate = format!("{first}{second}");
        if is_element(&candidate) {
            return Some(candidate);
        }
    }
    let symbol = first.to_string();
    is_element(&symbol).then_some(symbol)
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    text: String,
    quoted: bool,
}

impl Token {
    fn is_tag(&self) -> bool {
        !self.quoted && self.text.starts_with('_')
    }

    fn is_reserved(&self) -> bool {
        if self.quoted {
            return false;
        }
        let lower = self.text.to_ascii_lowercase();
        lower == "loop_" || lower.starts_with("data_") || lower.starts_with("save_")
    }
}

fn tokenize(text: &str) -> Result<Vec<Token>, CifError> {
    let mut tokens = Vec::new();
    let mut lines = text.lines();
    while let Some(line) = lines.next() {
        if let Some(first) = line.strip_prefix(';') {
            let mut field = first.to_string();
            let mut closed = false;
            for next in lines.by_ref() {
                if next.starts_with(';') {
                    closed = true;
                    break;
                }
                field.push('\n');
                field.push_str(next);
            }
            if !closed {
                return Err(CifError::Unterminated("text field"));
            }
            tokens.push(Token {
                text: field.trim().to_string(),
                quoted: true,
            });
            continue;
        }
        tokenize_line(line, &mut tokens)?;
    }
    Ok(tokens)
}

fn tokenize_line(line: &str, tokens: &mut Vec<Token>) -> Result<(), CifError> {
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '#' {
            break;
        }
        if c == '\'' || c == '"' {
            // A quote only closes when followed by whitespace or end of line.
            let start = i + 1;
            let mut j = start;
            loop {
                if j >= chars.len() {
                    return Err(CifError::Unterminated("quoted string"));
                }
                if chars[j] == c && chars.get(j + 1).map_or(true, |n| n.is_whitespace()) {
                    break;
                }
                j += 1;
            }
            tokens.push(Token {
                text: chars[start..j].iter().collect(),
                quoted: true,
            });
            i = j + 1;
            continue;
        }
        let start = i;
        while i < chars.len() && !chars[i].is_whitespace() {
            i += 1;
        }
        tokens.push(Token {
            text: chars[start..i].iter().collect(),
            quoted: false,
        });
    }
    Ok(())
}

/// Tags and loops of a single data block, keyed by lower-cased tag.
#[derive(Debug, Default)]
struct DataBlock {
    values: HashMap<String, String>,
    loops: Vec<Loop>,
}

#[derive(Debug)]
struct Loop {
    tags: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Loop {
    fn column(&self, tag: &str) -> Option<usize> {
        self.tags.iter().position(|t| t == tag)
    }
}

impl DataBlock {
    fn parse(text: &str) -> Result<Self, CifError> {
        let tokens = tokenize(text)?;
        let start = tokens
            .iter()
            .position(|t| !t.quoted && t.text.to_ascii_lowercase().starts_with("data_"))
            .ok_or(CifError::NoDataBlock)?;

        let mut block = Self::default();
        let mut i = start + 1;
        while i < tokens.len() {
            let token = &tokens[i];
            let lower = token.text.to_ascii_lowercase();
            if !token.quoted && lower.starts_with("data_") {
                break;
            }
            if !token.quoted && lower == "loop_" {
                i = block.parse_loop(&tokens, i + 1)?;
                continue;
            }
            if token.is_tag() {
                match tokens.get(i + 1) {
                    Some(value) if !value.is_tag() && !value.is_reserved() => {
                        block.values.insert(lower, value.text.clone());
                        i += 2;
                    }
                    _ => i += 1,
                }
                continue;
            }
            i += 1;
        }
        Ok(block)
    }

    fn parse_loop(&mut self, tokens: &[Token], mut i: usize) -> Result<usize, CifError> {
        let mut tags = Vec::new();
        while i < tokens.len() && tokens[i].is_tag() {
            tags.push(tokens[i].text.to_ascii_lowercase());
            i += 1;
        }
        let mut cells = Vec::new();
        while i < tokens.len() && !tokens[i].is_tag() && !tokens[i].is_reserved() {
            cells.push(tokens[i].text.clone());
            i += 1;
        }
        if tags.is_empty() {
            return Ok(i);
        }
        if cells.len() % tags.len() != 0 {
            return Err(CifError::RaggedLoop(tags[0].clone()));
        }
        let rows = cells.chunks(tags.len()).map(<[String]>::to_vec).collect();
        self.loops.push(Loop { tags, rows });
        Ok(i)
    }

    fn number(&self, tag: &'static str) -> Result<f64, CifError> {
        let raw = self.values.get(tag).ok_or(CifError::MissingTag(tag))?;
        parse_number(tag, raw)
    }

    fn find_loop(&self, tag: &str) -> Option<&Loop> {
        self.loops.iter().find(|l| l.column(tag).is_some())
    }

    fn symmetry_ops(&self) -> Result<Vec<SymmetryOp>, CifError> {
        const OP_TAGS: [&str; 2] = [
            "_symmetry_equiv_pos_as_xyz",
            "_space_group_symop_operation_xyz",
        ];
        for tag in OP_TAGS {
            if let Some(lp) = self.find_loop(tag) {
                let col = lp.column(tag).unwrap_or(0);
                let mut ops = lp
                    .rows
                    .iter()
                    .map(|row| SymmetryOp::parse(&row[col]))
                    .collect::<Result<Vec<_>, _>>()?;
                if !ops.contains(&SymmetryOp::identity()) {
                    ops.insert(0, SymmetryOp::identity());
                }
                return Ok(ops);
            }
            if let Some(single) = self.values.get(tag) {
                let mut ops = vec![SymmetryOp::identity()];
                let op = SymmetryOp::parse(single)?;
                if op != ops[0] {
                    ops.push(op);
                }
                return Ok(ops);
            }
        }
        Ok(vec![SymmetryOp::identity()])
    }

    fn atom_sites(&self) -> Result<Vec<Site>, CifError> {
        let lp = self
            .find_loop("_atom_site_fract_x")
            .ok_or(CifError::MissingTag("_atom_site_fract_x"))?;
        let col = |tag: &'static str| lp.column(tag).ok_or(CifError::MissingTag(tag));
        let (cx, cy, cz) = (
            col("_atom_site_fract_x")?,
            col("_atom_site_fract_y")?,
            col("_atom_site_fract_z")?,
        );
        let symbol_col = lp.column("_atom_site_type_symbol");
        let label_col = lp.column("_atom_site_label");
        if symbol_col.is_none() && label_col.is_none() {
            return Err(CifError::MissingTag("_atom_site_type_symbol"));
        }
        let occ_col = lp.column("_atom_site_occupancy");

        let mut sites = Vec::with_capacity(lp.rows.len());
        for row in &lp.rows {
            let raw = symbol_col
                .or(label_col)
                .map(|c| row[c].as_str())
                .unwrap_or_default();
            let element =
                element_from_symbol(raw).ok_or_else(|| CifError::UnknownElement(raw.to_string()))?;
            let occupancy = match occ_col.map(|c| row[c].as_str()) {
                None | Some("?") | Some(".") => 1.0,
                Some(v) => parse_number("_atom_site_occupancy", v)?,
            };
            sites.push(Site {
                element,
                frac_coords: [
                    parse_number("_atom_site_fract_x", &row[cx])?,
                    parse_number("_atom_site_fract_y", &row[cy])?,
                    parse_number("_atom_site_fract_z", &row[cz])?,
                ],
                occupancy,
            });
        }
        if sites.is_empty() {
            return Err(CifError::NoSites);
        }
        Ok(sites)
    }
}
