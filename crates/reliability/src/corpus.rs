//! Reliability test corpus.
//!
//! The built-in corpus crosses 45 base questions with the years 2020-2024.
//! A YAML corpus replaces it wholesale when configured.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ReliabilityError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    CentralBankSplit,
    FxGap,
    Inflation,
    AidFlows,
    Sanctions,
    SectorMetrics,
    Humanitarian,
    Banking,
    Trade,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Category::CentralBankSplit,
        Category::FxGap,
        Category::Inflation,
        Category::AidFlows,
        Category::Sanctions,
        Category::SectorMetrics,
        Category::Humanitarian,
        Category::Banking,
        Category::Trade,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::CentralBankSplit => "central_bank_split",
            Category::FxGap => "fx_gap",
            Category::Inflation => "inflation",
            Category::AidFlows => "aid_flows",
            Category::Sanctions => "sanctions",
            Category::SectorMetrics => "sector_metrics",
            Category::Humanitarian => "humanitarian",
            Category::Banking => "banking",
            Category::Trade => "trade",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

/// What a correct answer must contain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExpectedPattern {
    /// At least one keyword appears (case-insensitive substring).
    AnyKeyword { keywords: Vec<String> },
    /// Some number in the text lies within `[min, max]`.
    NumberInRange { min: f64, max: f64 },
    /// Some number in the text is at most `max`.
    NumberAtMost { max: f64 },
}

impl ExpectedPattern {
    pub fn matches(&self, text: &str) -> bool {
        match self {
            ExpectedPattern::AnyKeyword { keywords } => {
                let lower = text.to_lowercase();
                keywords
                    .iter()
                    .filter(|k| !k.trim().is_empty())
                    .any(|k| lower.contains(&k.to_lowercase()))
            }
            ExpectedPattern::NumberInRange { min, max } => extract_numbers(text).into_iter().any(|n| n >= *min && n <= *max),
            ExpectedPattern::NumberAtMost { max } => extract_numbers(text).into_iter().any(|n| n <= *max),
        }
    }
}

/// Numbers mentioned in `text`. Thousands separators are accepted; bare
/// four-digit years are not numbers for this purpose.
pub fn extract_numbers(text: &str) -> Vec<f64> {
    let mut out = Vec::new();
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        // Digits glued to letters ("E1", "H2") are identifiers, not numbers.
        let after_word = i > 0 && chars[i - 1].is_alphanumeric();
        let starts_number = (chars[i].is_ascii_digit() && !after_word)
            || (chars[i] == '-' && chars.get(i + 1).map_or(false, |c| c.is_ascii_digit()) && (i == 0 || chars[i - 1].is_whitespace()));
        if !starts_number {
            i += 1;
            continue;
        }
        let start = i;
        i += 1;
        while i < chars.len() {
            let c = chars[i];
            let joins = (c == ',' || c == '.') && chars.get(i + 1).map_or(false, |n| n.is_ascii_digit());
            if c.is_ascii_digit() || joins {
                i += 1;
            } else {
                break;
            }
        }
        let raw: String = chars[start..i].iter().collect();
        let grouped = raw.contains(',');
        let cleaned = raw.replace(',', "");
        if let Ok(value) = cleaned.parse::<f64>() {
            let year_like = !grouped && !cleaned.contains('.') && (1990.0..=2100.0).contains(&value);
            if !year_like {
                out.push(value);
            }
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReliabilityCase {
    pub case_id: String,
    pub name: String,
    pub category: Category,
    pub question: String,
    /// Claim subject the answer is adjudicated under.
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    pub difficulty: Difficulty,
    pub expected: ExpectedPattern,
    #[serde(default)]
    pub expected_sources: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Corpus {
    pub version: String,
    pub cases: Vec<ReliabilityCase>,
}

impl Corpus {
    pub fn builtin() -> Self {
        let mut cases = Vec::with_capacity(BASE_QUESTIONS.len() * YEARS.len());
        for base in BASE_QUESTIONS {
            for year in YEARS {
                cases.push(base.instantiate(year));
            }
        }
        Self {
            version: "builtin-1".to_string(),
            cases,
        }
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ReliabilityError> {
        let corpus: Corpus = serde_yaml::from_str(raw).map_err(|e| ReliabilityError::Yaml {
            path: "<inline>".into(),
            message: e.to_string(),
        })?;
        corpus.validate()?;
        Ok(corpus)
    }

    pub fn load(path: &Path) -> Result<Self, ReliabilityError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml(&raw).map_err(|e| match e {
            ReliabilityError::Yaml { message, .. } => ReliabilityError::Yaml {
                path: path.display().to_string(),
                message,
            },
            other => other,
        })
    }

    /// The configured corpus file if any, else the built-in corpus.
    pub fn load_or_builtin(path: Option<&Path>) -> Result<Self, ReliabilityError> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::builtin()),
        }
    }

    pub fn validate(&self) -> Result<(), ReliabilityError> {
        if self.cases.is_empty() {
            return Err(ReliabilityError::Corpus("corpus has no cases".into()));
        }
        let mut seen = HashSet::new();
        for case in &self.cases {
            if case.case_id.trim().is_empty() {
                return Err(ReliabilityError::Corpus("case with empty case_id".into()));
            }
            if case.question.trim().is_empty() || case.subject.trim().is_empty() {
                return Err(ReliabilityError::Corpus(format!("case {} needs a question and a subject", case.case_id)));
            }
            if !seen.insert(case.case_id.as_str()) {
                return Err(ReliabilityError::Corpus(format!("duplicate case_id {}", case.case_id)));
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    pub fn by_category(&self, category: Category) -> impl Iterator<Item = &ReliabilityCase> {
        self.cases.iter().filter(move |c| c.category == category)
    }
}

// ── Built-in questions ───────────────────────────────────────────────

const YEARS: [i32; 5] = [2020, 2021, 2022, 2023, 2024];

enum Seed {
    Any(&'static [&'static str]),
    Range(f64, f64),
    AtMost(f64),
}

struct BaseQuestion {
    slug: &'static str,
    category: Category,
    difficulty: Difficulty,
    /// `{year}` is substituted per case.
    question: &'static str,
    expected: Seed,
    sources: &'static [&'static str],
}

impl BaseQuestion {
    fn instantiate(&self, year: i32) -> ReliabilityCase {
        let expected = match self.expected {
            Seed::Any(words) => ExpectedPattern::AnyKeyword {
                keywords: words.iter().map(|w| w.to_string()).collect(),
            },
            Seed::Range(min, max) => ExpectedPattern::NumberInRange { min, max },
            Seed::AtMost(max) => ExpectedPattern::NumberAtMost { max },
        };
        ReliabilityCase {
            case_id: format!("{}-{}", self.slug, year),
            name: format!("{} {}", self.slug, year),
            category: self.category,
            question: self.question.replace("{year}", &year.to_string()),
            subject: self.slug.to_string(),
            year: Some(year),
            difficulty: self.difficulty,
            expected,
            expected_sources: self.sources.iter().map(|s| s.to_string()).collect(),
        }
    }
}

macro_rules! base {
    ($slug:literal, $cat:ident, $diff:ident, $q:literal, $exp:expr, [$($src:literal),*]) => {
        BaseQuestion {
            slug: $slug,
            category: Category::$cat,
            difficulty: Difficulty::$diff,
            question: $q,
            expected: $exp,
            sources: &[$($src),*],
        }
    };
}

const BASE_QUESTIONS: &[BaseQuestion] = &[
    // Central bank split
    base!("cbs-authorities", CentralBankSplit, Easy,
        "Which authorities operated a central bank in Yemen during {year}?",
        Seed::Any(&["aden", "sanaa"]), ["cby-aden", "cby-sanaa"]),
    base!("cbs-banknotes", CentralBankSplit, Medium,
        "How did the two central banks treat newly printed banknotes in {year}?",
        Seed::Any(&["banknote", "currency", "ban"]), ["cby-aden", "cby-sanaa"]),
    base!("cbs-reserves", CentralBankSplit, Hard,
        "What foreign reserves did the Aden central bank report for {year}?",
        Seed::Any(&["reserve", "deposit"]), ["cby-aden", "imf"]),
    base!("cbs-policy-rate", CentralBankSplit, Hard,
        "What policy rate did the Aden central bank set in {year}?",
        Seed::Range(5.0, 40.0), ["cby-aden"]),
    base!("cbs-interbank", CentralBankSplit, Medium,
        "Were transfers between banks in Aden and Sanaa restricted in {year}?",
        Seed::Any(&["restrict", "suspend", "block", "transfer"]), ["cby-aden", "cby-sanaa"]),
    // FX gap
    base!("fx-rate-aden", FxGap, Medium,
        "What was the average YER/USD exchange rate in Aden in {year}?",
        Seed::Range(500.0, 3000.0), ["cby-aden"]),
    base!("fx-rate-sanaa", FxGap, Medium,
        "What was the average YER/USD exchange rate in Sanaa in {year}?",
        Seed::Range(400.0, 700.0), ["cby-sanaa"]),
    base!("fx-gap", FxGap, Hard,
        "How large was the exchange rate gap between Aden and Sanaa in {year}?",
        Seed::Any(&["gap", "spread", "difference"]), ["cby-aden", "cby-sanaa"]),
    base!("fx-parallel-premium", FxGap, Hard,
        "What premium, in percent, did the parallel market carry over the official Aden rate in {year}?",
        Seed::AtMost(100.0), ["cby-aden", "world-bank"]),
    base!("fx-depreciation", FxGap, Medium,
        "How much did the rial depreciate in Aden during {year}?",
        Seed::Any(&["depreciat", "percent", "%"]), ["cby-aden", "imf"]),
    // Inflation
    base!("inflation-headline", Inflation, Medium,
        "What was headline consumer price inflation in Yemen in {year}?",
        Seed::Range(0.0, 100.0), ["cso", "imf"]),
    base!("inflation-food", Inflation, Medium,
        "How fast did food prices rise in Yemen in {year}?",
        Seed::Any(&["food", "price"]), ["wfp", "fao"]),
    base!("inflation-fuel", Inflation, Easy,
        "What happened to fuel prices in Yemen in {year}?",
        Seed::Any(&["fuel", "diesel", "petrol"]), ["wfp"]),
    base!("inflation-meb", Inflation, Hard,
        "What did the minimum expenditure basket cost in {year}?",
        Seed::Any(&["basket", "meb"]), ["wfp", "reach"]),
    base!("inflation-wages", Inflation, Hard,
        "Did public sector wages keep pace with prices in {year}?",
        Seed::Any(&["wage", "salar"]), ["world-bank"]),
    // Aid flows
    base!("aid-hrp-funding", AidFlows, Medium,
        "What percentage of the humanitarian response plan was funded in {year}?",
        Seed::Range(0.0, 100.0), ["ocha-fts"]),
    base!("aid-top-donors", AidFlows, Easy,
        "Who were the largest donors to Yemen in {year}?",
        Seed::Any(&["saudi", "united states", "uae", "european", "united kingdom", "germany"]), ["ocha-fts"]),
    base!("aid-cb-deposit", AidFlows, Medium,
        "Did the Aden central bank receive a foreign deposit or grant in {year}?",
        Seed::Any(&["deposit", "grant", "support"]), ["cby-aden"]),
    base!("aid-cash-transfers", AidFlows, Hard,
        "How many households received cash transfers in {year}?",
        Seed::Any(&["household", "cash"]), ["unicef", "world-bank"]),
    base!("aid-wfp-reach", AidFlows, Medium,
        "How many people did WFP assist in Yemen in {year}?",
        Seed::Any(&["million", "people"]), ["wfp"]),
    // Sanctions
    base!("sanctions-designations", Sanctions, Medium,
        "Which Yemeni entities were newly designated under sanctions in {year}?",
        Seed::Any(&["designat", "ofac", "sanction"]), ["ofac", "un-sc"]),
    base!("sanctions-terrorism", Sanctions, Hard,
        "What terrorism designations affected Yemen in {year}?",
        Seed::Any(&["terroris", "fto", "sdgt"]), ["us-state", "ofac"]),
    base!("sanctions-banks", Sanctions, Hard,
        "Were any Yemeni banks or exchange companies sanctioned in {year}?",
        Seed::Any(&["bank", "exchange"]), ["ofac"]),
    base!("sanctions-panel", Sanctions, Medium,
        "What did the UN Panel of Experts report on Yemen in {year}?",
        Seed::Any(&["panel", "report"]), ["un-sc"]),
    base!("sanctions-embargo", Sanctions, Easy,
        "What arms embargo measures applied to Yemen in {year}?",
        Seed::Any(&["embargo", "arms"]), ["un-sc"]),
    // Sector metrics
    base!("sector-gdp", SectorMetrics, Medium,
        "What was Yemen's real GDP growth rate in {year}?",
        Seed::Range(-30.0, 15.0), ["world-bank", "imf"]),
    base!("sector-oil-exports", SectorMetrics, Hard,
        "How much crude oil did Yemen export in {year}?",
        Seed::Any(&["barrel", "export", "halt"]), ["world-bank"]),
    base!("sector-fisheries", SectorMetrics, Hard,
        "What was Yemen's fisheries output in {year}?",
        Seed::Any(&["fish", "catch", "tonne"]), ["fao"]),
    base!("sector-electricity", SectorMetrics, Medium,
        "How many hours of grid electricity did Aden receive per day in {year}?",
        Seed::AtMost(24.0), ["world-bank"]),
    base!("sector-agriculture", SectorMetrics, Medium,
        "What share of employment did agriculture account for in {year}?",
        Seed::Range(0.0, 100.0), ["fao", "ilo"]),
    // Humanitarian
    base!("hum-people-in-need", Humanitarian, Easy,
        "How many million people needed humanitarian assistance in Yemen in {year}?",
        Seed::Range(10.0, 35.0), ["ocha"]),
    base!("hum-ipc", Humanitarian, Hard,
        "How many people were in IPC phase 3 or worse in {year}?",
        Seed::Any(&["ipc", "phase", "food insecur"]), ["ipc", "fao"]),
    base!("hum-idps", Humanitarian, Medium,
        "How many people were internally displaced in Yemen in {year}?",
        Seed::Any(&["displaced", "idp"]), ["iom", "unhcr"]),
    base!("hum-cholera", Humanitarian, Medium,
        "How many suspected cholera cases were reported in Yemen in {year}?",
        Seed::Any(&["cholera", "case"]), ["who"]),
    base!("hum-malnutrition", Humanitarian, Medium,
        "How many children were acutely malnourished in Yemen in {year}?",
        Seed::Any(&["malnourish", "malnutrition", "children"]), ["unicef"]),
    // Banking
    base!("banking-liquidity", Banking, Medium,
        "What liquidity constraints did Yemeni banks face in {year}?",
        Seed::Any(&["liquidity", "cash"]), ["cby-aden", "world-bank"]),
    base!("banking-relocation", Banking, Hard,
        "Did banks move their headquarters from Sanaa to Aden in {year}?",
        Seed::Any(&["relocat", "headquarter", "move"]), ["cby-aden"]),
    base!("banking-swift", Banking, Hard,
        "Did Yemeni banks keep SWIFT and correspondent access in {year}?",
        Seed::Any(&["swift", "correspondent"]), ["cby-aden"]),
    base!("banking-remittances", Banking, Medium,
        "What were remittance inflows to Yemen in {year}?",
        Seed::Any(&["remittance", "billion"]), ["world-bank"]),
    base!("banking-exchange-shops", Banking, Medium,
        "What measures targeted money exchange companies in {year}?",
        Seed::Any(&["exchange compan", "licen", "closure"]), ["cby-aden", "cby-sanaa"]),
    // Trade
    base!("trade-food-imports", Trade, Medium,
        "How much food did Yemen import in {year}?",
        Seed::Any(&["import", "tonne", "wheat"]), ["fao", "wfp"]),
    base!("trade-fuel-imports", Trade, Hard,
        "How much fuel entered Hodeidah port in {year}?",
        Seed::Any(&["hodeidah", "fuel", "tonne"]), ["unvim"]),
    base!("trade-balance", Trade, Medium,
        "What was Yemen's trade deficit in {year}?",
        Seed::Any(&["deficit", "billion"]), ["imf", "world-bank"]),
    base!("trade-red-sea", Trade, Hard,
        "How did Red Sea shipping disruption affect Yemen in {year}?",
        Seed::Any(&["red sea", "shipping", "freight"]), ["unctad"]),
    base!("trade-unvim", Trade, Hard,
        "How many vessels did UNVIM clear for Yemeni ports in {year}?",
        Seed::Any(&["vessel", "unvim", "clear"]), ["unvim"]),
];
