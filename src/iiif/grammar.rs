//! Per-version grammar tables for the five positional parameters.
//!
//! Each field has an *ignore* value, which short-circuits to the field's
//! default, and a pattern the raw string must match in full. The tables are
//! static data; patterns are compiled once on first use.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::IiifError;

// =============================================================================
// Protocol Version
// =============================================================================

/// IIIF Image API version selected by the first path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiVersion {
    V1,
    V2,
}

impl ApiVersion {
    /// Path segment for this version (`v1` or `v2`).
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiVersion::V1 => "v1",
            ApiVersion::V2 => "v2",
        }
    }

    /// Grammar table for this version.
    pub fn grammar(&self) -> &'static Grammar {
        match self {
            ApiVersion::V1 => &V1_GRAMMAR,
            ApiVersion::V2 => &V2_GRAMMAR,
        }
    }
}

impl FromStr for ApiVersion {
    type Err = IiifError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "v1" => Ok(ApiVersion::V1),
            "v2" => Ok(ApiVersion::V2),
            other => Err(IiifError::malformed("version", other)),
        }
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Fields and Rules
// =============================================================================

/// The five positional parameters, in validation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Region,
    Size,
    Rotation,
    Quality,
    Format,
}

impl Field {
    /// Validation order. The first failing field is the one reported.
    pub const ORDER: [Field; 5] = [
        Field::Region,
        Field::Size,
        Field::Rotation,
        Field::Quality,
        Field::Format,
    ];

    /// Name used in error reports.
    pub fn name(&self) -> &'static str {
        match self {
            Field::Region => "region",
            Field::Size => "size",
            Field::Rotation => "rotation",
            Field::Quality => "quality",
            Field::Format => "format",
        }
    }
}

/// Validation rule for one (version, field) pair.
#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    /// Raw value that resolves straight to the field default
    pub ignore: &'static str,

    /// Pattern the raw value must match (anchored)
    pub pattern: &'static str,
}

/// Grammar table for one protocol version.
#[derive(Debug)]
pub struct Grammar {
    pub region: FieldRule,
    pub size: FieldRule,
    pub rotation: FieldRule,
    pub quality: FieldRule,
    pub format: FieldRule,
}

impl Grammar {
    /// Rule for a field.
    pub fn rule(&self, field: Field) -> &FieldRule {
        match field {
            Field::Region => &self.region,
            Field::Size => &self.size,
            Field::Rotation => &self.rotation,
            Field::Quality => &self.quality,
            Field::Format => &self.format,
        }
    }
}

const REGION_RULE: FieldRule = FieldRule {
    ignore: "full",
    pattern: r"^(full|(pct:)?[\d.]+,[\d.]+,[\d.]+,[\d.]+)$",
};

const FORMAT_RULE: FieldRule = FieldRule {
    ignore: "",
    pattern: r"^(jpg|jpeg|png|gif|jp2|pdf)$",
};

/// Version 1 grammar: unmirrored rotation, `native` quality, no best-fit size.
pub static V1_GRAMMAR: Grammar = Grammar {
    region: REGION_RULE,
    size: FieldRule {
        ignore: "full",
        pattern: r"^(full|[\d.]+,|,[\d.]+|pct:[\d.]+|[\d.]+,[\d.]+)$",
    },
    rotation: FieldRule {
        ignore: "0",
        pattern: r"^[\d.]+$",
    },
    quality: FieldRule {
        ignore: "default",
        pattern: r"^(native|color|grey|bitonal)$",
    },
    format: FORMAT_RULE,
};

/// Version 2 grammar: `!`-mirrored rotation, `default` quality, best-fit size.
pub static V2_GRAMMAR: Grammar = Grammar {
    region: REGION_RULE,
    size: FieldRule {
        ignore: "full",
        pattern: r"^(full|[\d.]+,|,[\d.]+|pct:[\d.]+|[\d.]+,[\d.]+|![\d.]+,[\d.]+)$",
    },
    rotation: FieldRule {
        ignore: "0",
        pattern: r"^!?[\d.]+$",
    },
    quality: FieldRule {
        ignore: "default",
        pattern: r"^(default|color|gray|grey|bitonal)$",
    },
    format: FORMAT_RULE,
};

// =============================================================================
// Compiled Patterns
// =============================================================================

struct CompiledGrammar {
    patterns: [Regex; 5],
}

impl CompiledGrammar {
    fn compile(grammar: &Grammar) -> Self {
        let compile = |field: Field| {
            Regex::new(grammar.rule(field).pattern).expect("grammar pattern must compile")
        };
        Self {
            patterns: Field::ORDER.map(compile),
        }
    }

    fn pattern(&self, field: Field) -> &Regex {
        let index = Field::ORDER
            .iter()
            .position(|f| *f == field)
            .unwrap_or_default();
        &self.patterns[index]
    }
}

static V1_COMPILED: LazyLock<CompiledGrammar> =
    LazyLock::new(|| CompiledGrammar::compile(&V1_GRAMMAR));
static V2_COMPILED: LazyLock<CompiledGrammar> =
    LazyLock::new(|| CompiledGrammar::compile(&V2_GRAMMAR));

/// Outcome of checking a raw value against a field rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleMatch {
    /// Raw value equals the ignore value
    Ignored,
    /// Raw value matches the pattern
    Matched,
    /// Raw value is invalid for this field
    Rejected,
}

/// Check a raw parameter string against the version's grammar.
pub fn check(version: ApiVersion, field: Field, raw: &str) -> RuleMatch {
    if raw == version.grammar().rule(field).ignore {
        return RuleMatch::Ignored;
    }

    let compiled = match version {
        ApiVersion::V1 => &*V1_COMPILED,
        ApiVersion::V2 => &*V2_COMPILED,
    };

    if compiled.pattern(field).is_match(raw) {
        RuleMatch::Matched
    } else {
        RuleMatch::Rejected
    }
}

// =============================================================================
// Tests
// =============================================================================
