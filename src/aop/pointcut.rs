//! Pointcuts: predicates selecting the methods advice applies to.

use std::fmt;

use regex::{Regex, RegexBuilder};

use crate::definition::BeanClass;
use crate::error::{DiError, DiResult};

/// Matches classes and methods.
///
/// A method is advised when both `matches_class` and `matches_method`
/// accept it.
pub trait Pointcut: Send + Sync + fmt::Debug {
    fn matches_class(&self, class: &BeanClass) -> bool {
        let _ = class;
        true
    }

    fn matches_method(&self, class: &BeanClass, method: &str) -> bool;

    /// True when every method of a matching class matches, so beans
    /// without declared methods can still be advised.
    fn matches_every_method(&self) -> bool {
        false
    }
}

/// Whether `pointcut` can apply to any method of `class`.
pub fn can_apply(pointcut: &dyn Pointcut, class: &BeanClass) -> bool {
    if !pointcut.matches_class(class) {
        return false;
    }
    pointcut.matches_every_method() || class.methods().iter().any(|m| pointcut.matches_method(class, m))
}

/// Matches everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct TruePointcut;

impl Pointcut for TruePointcut {
    fn matches_method(&self, _class: &BeanClass, _method: &str) -> bool {
        true
    }

    fn matches_every_method(&self) -> bool {
        true
    }
}

/// Matches method names against simple `*` patterns such as `get*`,
/// `*Handler` or `save*All`.
#[derive(Debug, Clone)]
pub struct NameMatchPointcut {
    patterns: Vec<String>,
}

impl NameMatchPointcut {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }
}

impl Pointcut for NameMatchPointcut {
    fn matches_method(&self, _class: &BeanClass, method: &str) -> bool {
        self.patterns.iter().any(|p| simple_match(p, method))
    }
}

/// `*` wildcard matching without regex compilation.
pub(crate) fn simple_match(pattern: &str, text: &str) -> bool {
    let Some(first) = pattern.find('*') else {
        return pattern == text;
    };
    let (prefix, rest) = pattern.split_at(first);
    if !text.starts_with(prefix) {
        return false;
    }
    let mut remaining = &text[prefix.len()..];
    let segments: Vec<&str> = rest.split('*').filter(|s| !s.is_empty()).collect();
    let ends_open = rest.ends_with('*');
    for (i, segment) in segments.iter().enumerate() {
        let last = i + 1 == segments.len();
        if last && !ends_open {
            return remaining.ends_with(segment);
        }
        match remaining.find(segment) {
            Some(at) => remaining = &remaining[at + segment.len()..],
            None => return false,
        }
    }
    true
}

/// `execution(..)` pointcut expression.
///
/// Supported form: `execution([modifiers] <return> [<type>.]<method>(<args>))`
/// where the type and method may use `*` wildcards. An unqualified type is
/// compared case-insensitively with the simple type name and with the
/// names of the bean's interface bindings; a dotted type is compared with
/// the full path (`::` read as `.`), and `..` in it spans any number of
/// segments. Argument patterns are accepted but not checked.
///
/// # Examples
///
/// ```rust
/// use ferrous_context::aop::ExpressionPointcut;
///
/// let pointcut = ExpressionPointcut::parse("execution(* calculate.*(..))").unwrap();
/// assert_eq!(pointcut.expression(), "execution(* calculate.*(..))");
///
/// assert!(ExpressionPointcut::parse("within(com.example..*)").is_err());
/// ```
#[derive(Clone)]
pub struct ExpressionPointcut {
    expression: String,
    type_pattern: Option<Regex>,
    qualified: bool,
    method_pattern: Regex,
}

impl ExpressionPointcut {
    pub fn parse(expression: &str) -> DiResult<Self> {
        let invalid = |reason: &str| {
            DiError::Configuration(format!("Invalid pointcut expression '{expression}': {reason}"))
        };

        let body = expression
            .trim()
            .strip_prefix("execution(")
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(|| invalid("only execution(..) designators are supported"))?;

        let open = body.find('(').ok_or_else(|| invalid("missing parameter list"))?;
        if !body.ends_with(')') {
            return Err(invalid("unbalanced parentheses"));
        }
        let head = body[..open].trim();
        let target = head
            .rsplit(char::is_whitespace)
            .next()
            .filter(|t| !t.is_empty() && head.len() > t.len())
            .ok_or_else(|| invalid("expected '<return> <type>.<method>'"))?;

        let (type_part, method_part) = match target.rfind('.') {
            Some(dot) if dot > 0 && !target[..=dot].ends_with("..") => (Some(&target[..dot]), &target[dot + 1..]),
            Some(_) => return Err(invalid("method name missing after type pattern")),
            None => (None, target),
        };
        if method_part.is_empty() {
            return Err(invalid("empty method pattern"));
        }

        let qualified = type_part.is_some_and(|t| t.contains('.'));
        let type_pattern = match type_part {
            Some(t) => Some(
                RegexBuilder::new(&type_regex(t))
                    .case_insensitive(!qualified)
                    .build()
                    .map_err(|e| invalid(&e.to_string()))?,
            ),
            None => None,
        };
        let method_pattern =
            Regex::new(&format!("^{}$", glob_regex(method_part, ".*"))).map_err(|e| invalid(&e.to_string()))?;

        Ok(Self {
            expression: expression.trim().to_string(),
            type_pattern,
            qualified,
            method_pattern,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    fn matches_type(&self, class: &BeanClass) -> bool {
        let Some(pattern) = &self.type_pattern else {
            return true;
        };
        if self.qualified {
            let full = class.type_name().trim_start_matches("dyn ").replace("::", ".");
            return pattern.is_match(&full);
        }
        pattern.is_match(class.simple_name())
            || class
                .interfaces()
                .iter()
                .any(|binding| pattern.is_match(crate::definition::simple_name(binding.name())))
    }
}

fn type_regex(pattern: &str) -> String {
    let mut out = String::from("^");
    let mut parts = pattern.split("..").peekable();
    while let Some(part) = parts.next() {
        out.push_str(&glob_regex(part, "[^.]*"));
        if parts.peek().is_some() {
            out.push_str(r"\.(?:.*\.)?");
        }
    }
    out.push('$');
    out
}

fn glob_regex(pattern: &str, star: &str) -> String {
    pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(star)
}

impl Pointcut for ExpressionPointcut {
    fn matches_class(&self, class: &BeanClass) -> bool {
        self.matches_type(class)
    }

    fn matches_method(&self, class: &BeanClass, method: &str) -> bool {
        self.matches_type(class) && self.method_pattern.is_match(method)
    }
}

impl fmt::Debug for ExpressionPointcut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpressionPointcut")
            .field("expression", &self.expression)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::BeanDefinition;

    mod shop {
        pub struct OrderService;
    }

    fn class() -> BeanClass {
        BeanDefinition::of::<shop::OrderService, _>("orders", |_| Ok(shop::OrderService))
            .methods(&["place", "cancel", "find_all"])
            .class()
            .clone()
    }

    #[test]
    fn simple_match_patterns() {
        assert!(simple_match("get*", "getName"));
        assert!(simple_match("*Name", "getName"));
        assert!(simple_match("*et*", "getName"));
        assert!(simple_match("save*All", "saveItemsAll"));
        assert!(!simple_match("save*All", "saveItems"));
        assert!(simple_match("exact", "exact"));
        assert!(!simple_match("exact", "exactly"));
    }

    #[test]
    fn unqualified_type_matches_simple_name_case_insensitively() {
        let pc = ExpressionPointcut::parse("execution(* orderService.*(..))").unwrap();
        let class = class();
        assert!(can_apply(&pc, &class));
        assert!(pc.matches_method(&class, "place"));

        let other = ExpressionPointcut::parse("execution(* Inventory.*(..))").unwrap();
        assert!(!can_apply(&other, &class));
    }

    #[test]
    fn method_globs_and_modifiers() {
        let pc = ExpressionPointcut::parse("execution(public * OrderService.find*(..))").unwrap();
        let class = class();
        assert!(pc.matches_method(&class, "find_all"));
        assert!(!pc.matches_method(&class, "place"));
    }

    #[test]
    fn qualified_type_with_subpackage_wildcard() {
        let pc = ExpressionPointcut::parse("execution(* ferrous_context..OrderService.*(..))").unwrap();
        assert!(can_apply(&pc, &class()));

        let miss = ExpressionPointcut::parse("execution(* other..*.*(..))").unwrap();
        assert!(!can_apply(&miss, &class()));
    }

    #[test]
    fn method_only_expression_matches_any_type() {
        let pc = ExpressionPointcut::parse("execution(* cancel(..))").unwrap();
        assert!(can_apply(&pc, &class()));
    }

    #[test]
    fn malformed_expressions_are_configuration_errors() {
        for bad in ["execution(add(..))", "execution(* Foo.(..))", "call(* *(..))", "execution(* Foo.bar"] {
            assert!(
                matches!(ExpressionPointcut::parse(bad), Err(DiError::Configuration(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn class_without_declared_methods_needs_every_method_pointcut() {
        let bare = BeanClass::of::<u8>();
        assert!(can_apply(&TruePointcut, &bare));
        assert!(!can_apply(&NameMatchPointcut::new(["*"]), &bare));
    }
}
