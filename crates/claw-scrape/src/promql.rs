//! Topology label matcher injection for alert expressions.
//!
//! Alert rules contributed by a producer must only ever evaluate against that
//! producer's series. [`inject_matchers`] rewrites every vector selector in a
//! PromQL expression so it carries `juju_model`, `juju_model_uuid` and
//! `juju_application` equality matchers.
//!
//! This is a selector scanner, not a PromQL parser. It understands just
//! enough of the lexical structure (strings, comments, numbers, durations,
//! range brackets, function calls, aggregation label lists and keywords) to
//! tell metric selectors apart from everything else:
//!
//! ```rust
//! use claw_scrape::{inject_matchers, Topology};
//!
//! let topology = Topology::new("m", "u", "app")?;
//! let expr = inject_matchers("rate(http_requests_total{code=\"500\"}[5m]) > 1", &topology)?;
//! assert_eq!(
//!     expr,
//!     "rate(http_requests_total{code=\"500\", juju_model=\"m\", juju_model_uuid=\"u\", juju_application=\"app\"}[5m]) > 1"
//! );
//! # Ok::<(), claw_scrape::ScrapeError>(())
//! ```

use tracing::{debug, warn};

use crate::error::PromqlError;
use crate::rules::AlertRuleGroup;
use crate::topology::{Topology, escape_label_value};

/// Legacy placeholder replaced by the topology matcher list.
pub const TOPOLOGY_PLACEHOLDER: &str = "%%juju_topology%%";

/// Keywords followed by a parenthesized list of label names.
const LABEL_LIST_KEYWORDS: [&str; 6] = [
    "by",
    "without",
    "on",
    "ignoring",
    "group_left",
    "group_right",
];

/// Identifiers that are never metric names when not followed by `{` or `(`.
const KEYWORDS: [&str; 22] = [
    "and",
    "or",
    "unless",
    "bool",
    "offset",
    "atan2",
    "sum",
    "min",
    "max",
    "avg",
    "group",
    "stddev",
    "stdvar",
    "count",
    "count_values",
    "bottomk",
    "topk",
    "quantile",
    "limitk",
    "limit_ratio",
    "inf",
    "nan",
];

/// A rule whose expression could not be rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectionWarning {
    /// Group the rule belongs to.
    pub group: String,
    /// Alert name of the rule.
    pub alert: String,
    /// Why the expression was left untouched.
    pub error: PromqlError,
}

/// Rule groups after injection, plus any expressions that were skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InjectionReport {
    /// Labeled groups, in input order.
    pub groups: Vec<AlertRuleGroup>,
    /// Rules whose expression was published unmodified.
    pub warnings: Vec<InjectionWarning>,
}

/// Scopes every rule in `groups` to `topology`.
///
/// Expressions get topology matchers; rule labels and annotations get the
/// topology labels, overriding any producer value for the reserved names.
/// An expression that cannot be scanned is kept as is and reported.
#[must_use]
pub fn inject_groups(groups: &[AlertRuleGroup], topology: &Topology) -> InjectionReport {
    let topology = topology.application_scope();
    let topology_labels = topology.label_set();
    let mut report = InjectionReport::default();

    for group in groups {
        let mut labeled = group.clone();
        for rule in &mut labeled.rules {
            match inject_matchers(&rule.expr, &topology) {
                Ok(expr) => rule.expr = expr,
                Err(error) => {
                    warn!(
                        group = %group.name,
                        alert = %rule.alert,
                        error = %error,
                        "leaving alert expression without topology matchers"
                    );
                    report.warnings.push(InjectionWarning {
                        group: group.name.clone(),
                        alert: rule.alert.clone(),
                        error,
                    });
                }
            }
            rule.labels.extend(topology_labels.clone());
            rule.annotations.extend(topology_labels.clone());
        }
        report.groups.push(labeled);
    }

    debug!(
        groups = report.groups.len(),
        skipped = report.warnings.len(),
        topology = %topology,
        "injected topology into alert rules"
    );
    report
}

/// Adds topology equality matchers to every vector selector in `expr`.
///
/// Matchers already present for a reserved label are left alone, so applying
/// this twice gives the same result as applying it once.
///
/// # Errors
///
/// Returns [`PromqlError`] if the expression is empty, has unbalanced
/// parentheses, an unterminated string, bracket or matcher block, or an
/// unexpected character.
pub fn inject_matchers(expr: &str, topology: &Topology) -> Result<String, PromqlError> {
    let expr = if expr.contains(TOPOLOGY_PLACEHOLDER) {
        expr.replace(TOPOLOGY_PLACEHOLDER, &topology.promql_labels())
    } else {
        expr.to_string()
    };

    if expr.trim().is_empty() {
        return Err(PromqlError::new(0, "empty expression"));
    }

    let matchers: Vec<(&str, String)> = topology
        .matcher_labels()
        .into_iter()
        .map(|(name, value)| (name, format!("{name}=\"{}\"", escape_label_value(value))))
        .collect();

    let selectors = Scanner::new(&expr).selectors()?;

    let mut out = String::with_capacity(expr.len() + selectors.len() * 96);
    let mut copied = 0;
    for selector in selectors {
        let missing: Vec<&str> = matchers
            .iter()
            .filter(|(name, _)| !selector.names.iter().any(|n| n == name))
            .map(|(_, matcher)| matcher.as_str())
            .collect();
        if missing.is_empty() {
            continue;
        }

        out.push_str(&expr[copied..selector.insert_at]);
        let list = missing.join(", ");
        match selector.kind {
            SelectorKind::Bare => {
                out.push('{');
                out.push_str(&list);
                out.push('}');
            }
            SelectorKind::Block { needs_comma } => {
                if needs_comma {
                    out.push_str(", ");
                }
                out.push_str(&list);
            }
        }
        copied = selector.insert_at;
    }
    out.push_str(&expr[copied..]);
    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SelectorKind {
    /// Metric name without a matcher block; a new block is inserted.
    Bare,
    /// Existing matcher block; matchers are appended inside it.
    Block { needs_comma: bool },
}

/// One vector selector and where its matchers go.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Selector {
    insert_at: usize,
    kind: SelectorKind,
    names: Vec<String>,
}

struct Scanner<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn error(&self, reason: impl Into<String>) -> PromqlError {
        PromqlError::new(self.pos, reason)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|c| c.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    /// Position of the next non-whitespace byte, without consuming anything.
    fn next_significant(&self) -> usize {
        let mut i = self.pos;
        while self.bytes.get(i).is_some_and(u8::is_ascii_whitespace) {
            i += 1;
        }
        i
    }

    /// Collects every vector selector in source order.
    fn selectors(mut self) -> Result<Vec<Selector>, PromqlError> {
        let mut selectors = Vec::new();
        let mut depth: usize = 0;

        while let Some(c) = self.peek() {
            match c {
                c if c.is_ascii_whitespace() => self.pos += 1,
                b'#' => self.skip_comment(),
                b'"' | b'\'' | b'`' => {
                    self.skip_string()?;
                }
                b'(' => {
                    depth += 1;
                    self.pos += 1;
                }
                b')' => {
                    depth = depth
                        .checked_sub(1)
                        .ok_or_else(|| self.error("unbalanced ')'"))?;
                    self.pos += 1;
                }
                b'[' => self.skip_brackets()?,
                b'{' => selectors.push(self.matcher_block()?),
                b']' | b'}' => return Err(self.error(format!("unexpected '{}'", c as char))),
                c if c.is_ascii_digit() => self.skip_number(),
                b'.' if self.bytes.get(self.pos + 1).is_some_and(u8::is_ascii_digit) => {
                    self.skip_number();
                }
                c if is_ident_start(c) => {
                    if let Some(selector) = self.identifier()? {
                        selectors.push(selector);
                    }
                }
                b'+' | b'-' | b'*' | b'/' | b'%' | b'^' | b'=' | b'!' | b'<' | b'>' | b','
                | b'@' => self.pos += 1,
                _ => {
                    let ch = self.src[self.pos..].chars().next().unwrap_or('?');
                    return Err(self.error(format!("unexpected character '{ch}'")));
                }
            }
        }

        if depth != 0 {
            return Err(self.error("unbalanced '('"));
        }
        Ok(selectors)
    }

    fn skip_comment(&mut self) {
        while let Some(c) = self.peek() {
            self.pos += 1;
            if c == b'\n' {
                break;
            }
        }
    }

    /// Skips a quoted string starting at the current quote character.
    fn skip_string(&mut self) -> Result<&'a str, PromqlError> {
        let start = self.pos;
        let quote = self.bytes[start];
        self.pos += 1;
        while let Some(c) = self.peek() {
            if c == b'\\' && quote != b'`' {
                self.pos += 2;
                continue;
            }
            self.pos += 1;
            if c == quote {
                return Ok(&self.src[start + 1..self.pos - 1]);
            }
        }
        self.pos = start;
        Err(self.error("unterminated string"))
    }

    fn skip_brackets(&mut self) -> Result<(), PromqlError> {
        let start = self.pos;
        match self.src[start..].find(']') {
            Some(offset) => {
                self.pos = start + offset + 1;
                Ok(())
            }
            None => Err(self.error("unterminated '['")),
        }
    }

    fn skip_number(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == b'.' || c == b'_' {
                let exponent = matches!(c, b'e' | b'E')
                    && self.pos > 0
                    && self.bytes[self.pos - 1].is_ascii_digit()
                    && matches!(self.bytes.get(self.pos + 1), Some(b'+' | b'-'));
                self.pos += if exponent { 2 } else { 1 };
            } else {
                break;
            }
        }
    }

    fn read_identifier(&mut self) -> &'a str {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_char) {
            self.pos += 1;
        }
        &self.src[start..self.pos]
    }

    /// Handles an identifier; returns a selector if it names a metric.
    fn identifier(&mut self) -> Result<Option<Selector>, PromqlError> {
        let name = self.read_identifier();
        let end = self.pos;
        let next = self.next_significant();

        match self.bytes.get(next) {
            Some(b'(') if is_one_of(name, &LABEL_LIST_KEYWORDS) => {
                self.pos = next;
                self.skip_label_list()?;
                Ok(None)
            }
            Some(b'{') => {
                self.pos = next;
                self.matcher_block().map(Some)
            }
            // Function call or aggregation; the parenthesis is consumed by the caller.
            Some(b'(') => Ok(None),
            _ if is_one_of(name, &KEYWORDS) || is_one_of(name, &LABEL_LIST_KEYWORDS) => Ok(None),
            _ => Ok(Some(Selector {
                insert_at: end,
                kind: SelectorKind::Bare,
                names: Vec::new(),
            })),
        }
    }

    fn skip_label_list(&mut self) -> Result<(), PromqlError> {
        let open = self.pos;
        self.pos += 1;
        while let Some(c) = self.peek() {
            match c {
                b')' => {
                    self.pos += 1;
                    return Ok(());
                }
                b'"' | b'\'' | b'`' => {
                    self.skip_string()?;
                }
                _ => self.pos += 1,
            }
        }
        self.pos = open;
        Err(self.error("unterminated label list"))
    }

    /// Parses a `{...}` matcher block starting at the current `{`.
    fn matcher_block(&mut self) -> Result<Selector, PromqlError> {
        let open = self.pos;
        self.pos += 1;

        let mut names = Vec::new();
        let mut insert_at = self.pos;
        let mut has_entries = false;
        let mut trailing_comma = false;

        loop {
            self.skip_whitespace();
            match self.peek() {
                None => {
                    self.pos = open;
                    return Err(self.error("unterminated '{'"));
                }
                Some(b'}') => {
                    self.pos += 1;
                    return Ok(Selector {
                        insert_at,
                        kind: SelectorKind::Block {
                            needs_comma: has_entries && !trailing_comma,
                        },
                        names,
                    });
                }
                Some(_) => {}
            }

            let quoted_name = matches!(self.peek(), Some(b'"' | b'\''));
            let label = if quoted_name {
                self.skip_string()?
            } else if self.peek().is_some_and(is_ident_start) {
                self.read_identifier()
            } else {
                return Err(self.error("expected label name"));
            };

            self.skip_whitespace();
            let rest = &self.bytes[self.pos..];
            let two_byte_op = [b"=~", b"!~", b"!="].iter().any(|op| rest.starts_with(*op));
            let op_len = if two_byte_op {
                2
            } else if rest.starts_with(b"=") {
                1
            } else if quoted_name && matches!(rest.first(), Some(b',' | b'}')) {
                // `{"metric_name"}`: a quoted metric name, not a matcher.
                0
            } else {
                return Err(self.error("expected matcher operator"));
            };

            if op_len > 0 {
                self.pos += op_len;
                self.skip_whitespace();
                self.matcher_value()?;
                names.push(label.to_string());
            }
            has_entries = true;
            trailing_comma = false;
            insert_at = self.pos;

            self.skip_whitespace();
            match self.peek() {
                Some(b',') => {
                    self.pos += 1;
                    trailing_comma = true;
                    insert_at = self.pos;
                }
                Some(b'}') => {}
                None => {
                    self.pos = open;
                    return Err(self.error("unterminated '{'"));
                }
                Some(_) => return Err(self.error("expected ',' or '}'")),
            }
        }
    }

    /// Skips a matcher value: a quoted string or, leniently, a bare token.
    fn matcher_value(&mut self) -> Result<(), PromqlError> {
        if matches!(self.peek(), Some(b'"' | b'\'' | b'`')) {
            self.skip_string()?;
            return Ok(());
        }
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| !c.is_ascii_whitespace() && c != b',' && c != b'}')
        {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.error("expected matcher value"));
        }
        Ok(())
    }
}

const fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_' || c == b':'
}

const fn is_ident_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_' || c == b':'
}

fn is_one_of(ident: &str, set: &[&str]) -> bool {
    set.iter().any(|k| k.eq_ignore_ascii_case(ident))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::AlertRule;
    use crate::topology::{JUJU_APPLICATION, JUJU_MODEL, JUJU_UNIT};

    const TOPO: &str = r#"juju_model="m", juju_model_uuid="u", juju_application="app""#;

    fn topology() -> Topology {
        Topology::new("m", "u", "app").unwrap()
    }

    fn inject(expr: &str) -> String {
        inject_matchers(expr, &topology()).unwrap()
    }

    mod selector_tests {
        use super::*;

        #[test]
        fn bare_metric_gets_block() {
            assert_eq!(inject("up == 0"), format!("up{{{TOPO}}} == 0"));
        }

        #[test]
        fn existing_block_is_extended() {
            assert_eq!(
                inject(r#"up{job="node"}"#),
                format!(r#"up{{job="node", {TOPO}}}"#)
            );
        }

        #[test]
        fn unquoted_matcher_value_is_tolerated() {
            let out = inject("job:request_latency_seconds:mean5m{my_key=my_value} > 0.5");
            assert_eq!(
                out,
                format!("job:request_latency_seconds:mean5m{{my_key=my_value, {TOPO}}} > 0.5")
            );
            for label in ["juju_model=", "juju_model_uuid=", "juju_application="] {
                assert_eq!(out.matches(label).count(), 1, "{label} duplicated");
            }
        }

        #[test]
        fn empty_block_is_filled() {
            assert_eq!(inject("up{}"), format!("up{{{TOPO}}}"));
        }

        #[test]
        fn trailing_comma_is_respected() {
            assert_eq!(
                inject(r#"up{job="a",}"#),
                format!(r#"up{{job="a",{TOPO}}}"#)
            );
        }

        #[test]
        fn whitespace_before_block() {
            assert_eq!(
                inject(r#"up {job="a"}"#),
                format!(r#"up {{job="a", {TOPO}}}"#)
            );
        }

        #[test]
        fn nameless_selector() {
            assert_eq!(
                inject(r#"{__name__=~"http_.*"}"#),
                format!(r#"{{__name__=~"http_.*", {TOPO}}}"#)
            );
        }

        #[test]
        fn quoted_metric_name_in_block() {
            assert_eq!(
                inject(r#"{"http.requests"}"#),
                format!(r#"{{"http.requests", {TOPO}}}"#)
            );
        }

        #[test]
        fn producer_matchers_are_preserved() {
            assert_eq!(
                inject(r#"up{juju_application="other"}"#),
                r#"up{juju_application="other", juju_model="m", juju_model_uuid="u"}"#
            );
        }

        #[test]
        fn all_operators_count_as_existing() {
            let expr = r#"up{juju_model!="x", juju_model_uuid=~"u.*", juju_application!~"y"}"#;
            assert_eq!(inject(expr), expr);
        }

        #[test]
        fn range_vector() {
            assert_eq!(
                inject("rate(http_requests_total[5m])"),
                format!("rate(http_requests_total{{{TOPO}}}[5m])")
            );
        }

        #[test]
        fn offset_and_at_modifiers() {
            assert_eq!(
                inject("up offset 5m @ 1609746000"),
                format!("up{{{TOPO}}} offset 5m @ 1609746000")
            );
        }

        #[test]
        fn matcher_values_are_escaped() {
            let t = Topology::new("m", "u", r#"we"ird"#).unwrap();
            let out = inject_matchers("up", &t).unwrap();
            assert!(out.contains(r#"juju_application="we\"ird""#));
        }

        #[test]
        fn placeholder_is_rendered() {
            assert_eq!(
                inject("up{%%juju_topology%%} == 0"),
                format!("up{{{TOPO}}} == 0")
            );
        }
    }

    mod multi_selector_tests {
        use super::*;

        #[test]
        fn binary_expression() {
            assert_eq!(
                inject("mem_used / mem_total > 0.9"),
                format!("mem_used{{{TOPO}}} / mem_total{{{TOPO}}} > 0.9")
            );
        }

        #[test]
        fn aggregation_with_by_clause() {
            assert_eq!(
                inject("sum by (job) (rate(errors_total[5m]))"),
                format!("sum by (job) (rate(errors_total{{{TOPO}}}[5m]))")
            );
        }

        #[test]
        fn aggregation_with_trailing_without() {
            assert_eq!(
                inject("max(cpu) without (instance, cpu)"),
                format!("max(cpu{{{TOPO}}}) without (instance, cpu)")
            );
        }

        #[test]
        fn vector_matching_clauses() {
            assert_eq!(
                inject("a * on (job) group_left (owner) b"),
                format!("a{{{TOPO}}} * on (job) group_left (owner) b{{{TOPO}}}")
            );
        }

        #[test]
        fn set_operators_and_bool() {
            assert_eq!(
                inject("a > bool 1 and b unless c"),
                format!("a{{{TOPO}}} > bool 1 and b{{{TOPO}}} unless c{{{TOPO}}}")
            );
        }

        #[test]
        fn subquery() {
            assert_eq!(
                inject("max_over_time(rate(x[1m])[30m:1m])"),
                format!("max_over_time(rate(x{{{TOPO}}}[1m])[30m:1m])")
            );
        }

        #[test]
        fn histogram_quantile_nested() {
            assert_eq!(
                inject("histogram_quantile(0.95, sum(rate(latency_bucket[5m])) by (le)) > 30"),
                format!(
                    "histogram_quantile(0.95, sum(rate(latency_bucket{{{TOPO}}}[5m])) by (le)) > 30"
                )
            );
        }

        #[test]
        fn string_arguments_are_not_selectors() {
            assert_eq!(
                inject(r#"label_replace(up, "dst", "$1", "src", "(.*)")"#),
                format!(r#"label_replace(up{{{TOPO}}}, "dst", "$1", "src", "(.*)")"#)
            );
        }

        #[test]
        fn numbers_and_literals() {
            assert_eq!(
                inject("x > 1e+9 or y < Inf or z > 0x1F"),
                format!("x{{{TOPO}}} > 1e+9 or y{{{TOPO}}} < Inf or z{{{TOPO}}} > 0x1F")
            );
        }

        #[test]
        fn uppercase_keywords() {
            assert_eq!(
                inject("SUM BY (job) (up)"),
                format!("SUM BY (job) (up{{{TOPO}}})")
            );
        }

        #[test]
        fn comments_are_skipped() {
            assert_eq!(
                inject("up # the up metric\n== 0"),
                format!("up{{{TOPO}}} # the up metric\n== 0")
            );
        }

        #[test]
        fn pure_scalar_expression_is_unchanged() {
            assert_eq!(inject("vector(1) > 0"), "vector(1) > 0");
        }
    }

    mod idempotence_tests {
        use super::*;
        use test_case::test_case;

        #[test_case("up == 0" ; "bare")]
        #[test_case("job:request_latency_seconds:mean5m{my_key=my_value} > 0.5" ; "bare value")]
        #[test_case(r#"sum by (job) (rate(x{code=~"5.."}[5m])) / sum(rate(x[5m]))"# ; "ratio")]
        #[test_case("{__name__=\"up\"}" ; "nameless")]
        #[test_case("up{job=\"a\",}" ; "trailing comma")]
        fn injecting_twice_is_injecting_once(expr: &str) {
            let once = inject(expr);
            assert_eq!(inject(&once), once);
        }
    }

    mod error_tests {
        use super::*;
        use test_case::test_case;

        #[test_case("" ; "empty")]
        #[test_case("   " ; "blank")]
        #[test_case("rate(up[5m]" ; "unclosed paren")]
        #[test_case("up)" ; "extra paren")]
        #[test_case("up{job=\"a\"" ; "unclosed block")]
        #[test_case("up{job=\"a}" ; "unclosed string")]
        #[test_case("up[5m" ; "unclosed bracket")]
        #[test_case("up{job}" ; "missing operator")]
        #[test_case("up{job=}" ; "missing value")]
        #[test_case("up{=\"a\"}" ; "missing name")]
        #[test_case("up $ 1" ; "illegal character")]
        #[test_case("up}" ; "stray brace")]
        fn malformed_expressions_fail(expr: &str) {
            assert!(
                inject_matchers(expr, &topology()).is_err(),
                "{expr:?} accepted"
            );
        }

        #[test]
        fn error_carries_position() {
            let err = inject_matchers("up $ 1", &topology()).unwrap_err();
            assert_eq!(err.position, 3);
        }
    }

    mod group_tests {
        use super::*;

        fn groups() -> Vec<AlertRuleGroup> {
            let mut good = AlertRule::new("Down", "up == 0");
            good.labels.insert("severity".to_string(), "page".to_string());
            good.labels.insert(JUJU_APPLICATION.to_string(), "forged".to_string());
            let bad = AlertRule::new("Broken", "rate(up[5m]");
            vec![AlertRuleGroup::new("g", vec![good, bad])]
        }

        #[test]
        fn rules_get_matchers_and_labels() {
            let report = inject_groups(&groups(), &topology());
            let rule = &report.groups[0].rules[0];
            assert_eq!(rule.expr, format!("up{{{TOPO}}} == 0"));
            assert_eq!(rule.labels["severity"], "page");
            assert_eq!(rule.labels[JUJU_APPLICATION], "app");
            assert_eq!(rule.labels[JUJU_MODEL], "m");
            assert_eq!(rule.annotations[JUJU_MODEL], "m");
        }

        #[test]
        fn unparseable_rule_is_kept_and_reported() {
            let report = inject_groups(&groups(), &topology());
            assert_eq!(report.groups[0].rules.len(), 2);
            let bad = &report.groups[0].rules[1];
            assert_eq!(bad.expr, "rate(up[5m]");
            assert_eq!(bad.labels[JUJU_APPLICATION], "app");
            assert_eq!(report.warnings.len(), 1);
            assert_eq!(report.warnings[0].alert, "Broken");
            assert_eq!(report.warnings[0].group, "g");
        }

        #[test]
        fn unit_is_never_injected() {
            let t = topology().with_unit("app/3");
            let report = inject_groups(&groups(), &t);
            let rule = &report.groups[0].rules[0];
            assert!(!rule.labels.contains_key(JUJU_UNIT));
            assert!(!rule.expr.contains(JUJU_UNIT));
        }

        #[test]
        fn group_injection_is_idempotent() {
            let once = inject_groups(&groups(), &topology());
            let twice = inject_groups(&once.groups, &topology());
            assert_eq!(once.groups, twice.groups);
        }
    }
}
