//! Critique gate — decides whether an answer deserves a second look.
//!
//! The gate is a pure function of the question and the finished answer:
//!
//! 1. The question asks about a mechanism, a comparison, a rationale or a
//!    trend → critique.
//! 2. Otherwise the answer is long (more than 100 characters) **and** either
//!    uses technical vocabulary or is visibly structured (line breaks, bullet
//!    or numbered lines) → critique.
//! 3. Otherwise → no critique.

use std::sync::LazyLock;

use regex::Regex;

/// Answers at or below this many characters never trigger on length.
pub const SUBSTANTIAL_ANSWER_CHARS: usize = 100;

/// Opening used when the question itself invites deeper analysis.
pub const OPENING_DEEPER: &str = "🤔 让我换个角度，补充一些更深入的思考：";

/// Opening used when a long, technical answer is reviewed.
pub const OPENING_REVIEW: &str = "🔍 对上面的回答做一点审视和补充：";

/// Question words that mark mechanism, comparison, rationale or trend questions.
const COMPLEXITY_KEYWORDS_ZH: &[&str] = &[
    "为什么", "原理", "如何", "怎么", "原因", "机制", "区别", "比较", "对比", "优缺点", "影响",
    "趋势", "发展",
];

/// English counterparts, matched case-insensitively.
const COMPLEXITY_KEYWORDS_EN: &[&str] = &[
    "why",
    "how does",
    "how do",
    "how is",
    "explain",
    "mechanism",
    "compare",
    "comparison",
    "difference",
    "versus",
    " vs ",
    "pros and cons",
    "trade-off",
    "tradeoff",
    "trend",
];

const TECHNICAL_TERMS_ZH: &[&str] = &[
    "算法", "模型", "架构", "协议", "框架", "神经网络", "数据结构", "数据库", "编译", "并发",
    "分布式", "机器学习", "深度学习",
];

const TECHNICAL_TERMS_EN: &[&str] = &[
    "algorithm",
    "model",
    "architecture",
    "protocol",
    "framework",
    "neural",
    "api",
    "database",
    "compiler",
    "concurrency",
    "distributed",
];

/// A line starting with a bullet (`-`, `*`, `•`) or an enumeration (`1.`, `2)`, `一、`).
static STRUCTURED_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:[-*•]\s|\d+[.)、]\s?|[一二三四五六七八九十]+、)")
        .unwrap_or_else(|e| panic!("invalid structured-line pattern: {e}"))
});

/// Why the gate fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CritiqueReason {
    /// The question contains a complexity keyword.
    ComplexQuestion,
    /// The answer is long and technical or structured.
    SubstantialAnswer,
}

impl CritiqueReason {
    /// The fixed sentence the critic message starts with.
    pub fn opening(&self) -> &'static str {
        match self {
            Self::ComplexQuestion => OPENING_DEEPER,
            Self::SubstantialAnswer => OPENING_REVIEW,
        }
    }
}

/// Decide whether to run the critique pass.
pub fn should_critique(question: &str, answer: &str) -> bool {
    assess(question, answer).is_some()
}

/// Like [`should_critique`], but reports which rule fired.
pub fn assess(question: &str, answer: &str) -> Option<CritiqueReason> {
    if is_complex_question(question) {
        return Some(CritiqueReason::ComplexQuestion);
    }

    if answer.chars().count() > SUBSTANTIAL_ANSWER_CHARS
        && (has_technical_terms(answer) || is_structured(answer))
    {
        return Some(CritiqueReason::SubstantialAnswer);
    }

    None
}

fn is_complex_question(question: &str) -> bool {
    if COMPLEXITY_KEYWORDS_ZH.iter().any(|k| question.contains(k)) {
        return true;
    }
    let lower = format!(" {} ", question.to_lowercase());
    COMPLEXITY_KEYWORDS_EN.iter().any(|k| contains_word(&lower, k))
}

fn has_technical_terms(answer: &str) -> bool {
    if TECHNICAL_TERMS_ZH.iter().any(|t| answer.contains(t)) {
        return true;
    }
    let lower = answer.to_lowercase();
    TECHNICAL_TERMS_EN.iter().any(|t| contains_term(&lower, t))
}

fn is_structured(answer: &str) -> bool {
    answer.trim().contains('\n') || STRUCTURED_LINE.is_match(answer)
}

/// Match `needle` only where it is not glued to other ASCII letters,
/// so "why" does not fire inside "anywhy" and "api" not inside "rapid".
fn contains_word(haystack: &str, needle: &str) -> bool {
    contains_with_suffixes(haystack, needle, &[""])
}

/// Like [`contains_word`], but plurals count too ("models", "apis").
fn contains_term(haystack: &str, term: &str) -> bool {
    contains_with_suffixes(haystack, term, &["", "s", "es"])
}

fn contains_with_suffixes(haystack: &str, needle: &str, suffixes: &[&str]) -> bool {
    let ends_word = |tail: &str| !tail.chars().next().is_some_and(|c| c.is_ascii_alphabetic());
    haystack.match_indices(needle).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let rest = &haystack[start + needle.len()..];
        !before.is_some_and(|c| c.is_ascii_alphabetic())
            && suffixes
                .iter()
                .any(|suffix| rest.strip_prefix(*suffix).is_some_and(ends_word))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_answer_with(term: &str) -> String {
        let mut answer = format!("这个{term}的核心思想");
        while answer.chars().count() < 120 {
            answer.push_str("是逐步逼近最优解");
        }
        answer
    }

    #[test]
    fn mechanism_question_triggers() {
        assert!(should_critique("这是什么原理", ""));
        assert_eq!(assess("为什么NLU重要", "短"), Some(CritiqueReason::ComplexQuestion));
    }

    #[test]
    fn trivial_exchange_does_not_trigger() {
        assert!(!should_critique("hi", "ok"));
        assert!(!should_critique("你好", "你好！有什么可以帮你？"));
    }

    #[test]
    fn english_keywords_are_case_insensitive() {
        assert!(should_critique("WHY is the sky blue?", ""));
        assert!(should_critique("Can you Explain borrowing?", ""));
        assert!(should_critique("Rust versus Go", ""));
        assert!(!should_critique("anywhy", ""));
    }

    #[test]
    fn long_technical_answer_triggers() {
        let answer = long_answer_with("算法");
        assert!(answer.chars().count() > 100);
        assert!(!answer.contains('\n'));
        assert_eq!(assess("hi", &answer), Some(CritiqueReason::SubstantialAnswer));
    }

    #[test]
    fn plural_technical_terms_count() {
        for term in ["models", "algorithms", "APIs", "databases"] {
            let answer = long_answer_with(term);
            assert_eq!(
                assess("hi", &answer),
                Some(CritiqueReason::SubstantialAnswer),
                "{term}"
            );
        }
    }

    #[test]
    fn technical_terms_still_need_word_boundaries() {
        for word in ["modelling", "rapid", "apist"] {
            assert!(!should_critique("hi", &long_answer_with(word)), "{word}");
        }
        assert!(contains_word("why not", "why"));
        assert!(!contains_word("whys", "why"));
    }

    #[test]
    fn long_plain_answer_does_not_trigger() {
        let answer = long_answer_with("方法");
        assert!(!should_critique("hi", &answer));
    }

    #[test]
    fn long_structured_answer_triggers() {
        let mut answer = String::from("主要有以下几点：\n");
        for i in 1..=4 {
            answer.push_str(&format!("{i}. 第{i}点需要注意的是细节和上下文的一致性，避免误解。\n"));
        }
        assert!(answer.chars().count() > 100);
        assert!(should_critique("hi", &answer));
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        // 60 CJK characters are 180 bytes but only 60 characters.
        let answer = "模型".repeat(30);
        assert!(answer.len() > 100);
        assert!(!should_critique("hi", &answer));
    }

    #[test]
    fn structured_line_markers() {
        assert!(is_structured("intro\n- point"));
        assert!(is_structured("1. first"));
        assert!(is_structured("一、背景"));
        assert!(!is_structured("a single line"));
    }

    #[test]
    fn openings_differ_by_reason() {
        assert_ne!(
            CritiqueReason::ComplexQuestion.opening(),
            CritiqueReason::SubstantialAnswer.opening()
        );
    }
}
