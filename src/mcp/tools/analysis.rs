use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::envelope::{provenance_ids, Envelope, Source};
use crate::error::ToolFailure;
use crate::mcp::tools::{respond, SkyTools, ANALYZE_SYNTHESIS_PARAMETERS};
use crate::mcp::types::{AnalyzeTextRequest, SynthesisParameters};

static TEMPERATURE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(\d+)\s*°C",
        r"(\d+)\s*K",
        r"(\d+)\s*degrees?\s*C",
        r"(\d+)\s*celsius",
    ])
});

static DURATION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(\d+)\s*hours?",
        r"(\d+)\s*h\b",
        r"(\d+)\s*minutes?",
        r"(\d+)\s*min\b",
        r"(\d+)\s*days?",
    ])
});

const METHOD_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "solid_state",
        &["solid state", "ceramic", "calcination", "sintering"],
    ),
    ("sol_gel", &["sol-gel", "sol gel", "gelation", "xerogel"]),
    ("hydrothermal", &["hydrothermal", "solvothermal", "autoclave"]),
    (
        "precipitation",
        &["precipitation", "coprecipitation", "co-precipitation"],
    ),
    ("cvd", &["cvd", "chemical vapor", "vapor deposition"]),
    ("combustion", &["combustion", "self-propagating", "shs"]),
    ("flux", &["flux", "molten salt", "flux growth"]),
];

const ATMOSPHERES: &[&str] = &[
    "air", "argon", "nitrogen", "n2", "ar", "oxygen", "o2", "vacuum", "inert",
];

// Whole words only: "ar" must not fire inside "heat" or "carbonate".
static ATMOSPHERE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\b({})\b", ATMOSPHERES.join("|")))
        .expect("invalid atmosphere pattern")
});

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(&format!("(?i){p}")).expect("invalid synthesis pattern"))
        .collect()
}

impl SkyTools {
    /// Pull temperatures, durations, methods and atmospheres out of free text.
    pub async fn analyze_synthesis_parameters(&self, request: AnalyzeTextRequest) -> Envelope {
        respond(
            ANALYZE_SYNTHESIS_PARAMETERS,
            &[],
            analyze(&request.text).map(|params| {
                (params, provenance_ids(Source::Computed, Vec::<String>::new()))
            }),
        )
    }
}

fn analyze(text: &str) -> Result<SynthesisParameters, ToolFailure> {
    if text.trim().is_empty() {
        return Err(ToolFailure::invalid_input("text is required."));
    }

    let temperatures = captures(&TEMPERATURE_PATTERNS, text);
    let durations = captures(&DURATION_PATTERNS, text);

    let lower = text.to_lowercase();
    let methods: BTreeSet<String> = METHOD_KEYWORDS
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(method, _)| method.to_string())
        .collect();

    let atmosphere: BTreeSet<String> = ATMOSPHERE_PATTERN
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect();

    Ok(SynthesisParameters {
        has_heating: !temperatures.is_empty(),
        temperatures_c: temperatures.into_iter().collect(),
        time_durations: durations.into_iter().collect(),
        synthesis_methods: methods.into_iter().collect(),
        atmosphere: atmosphere.into_iter().collect(),
        text_length: text.chars().count(),
    })
}

/// First capture group of every match, de-duplicated and sorted.
fn captures(patterns: &[Regex], text: &str) -> BTreeSet<String> {
    patterns
        .iter()
        .flat_map(|re| re.captures_iter(text))
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect()
}
