use crate::sorts::SmtSort;
use crate::terms::SmtTerm;

/// Render a symbol, quoting it with `|...|` unless it is a simple SMT-LIB
/// symbol. Edge variables such as `po(1,2)` always need quoting.
///
/// Quoted symbols may not contain `|` or `\`. Those and `#` itself are
/// written as `#` plus two hex digits, which keeps distinct names distinct.
pub fn symbol(name: &str) -> String {
    let simple = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "~!@$%^&*_-+=<>.?/".contains(c));
    if simple {
        return name.to_string();
    }
    let mut out = String::with_capacity(name.len() + 2);
    out.push('|');
    for c in name.chars() {
        match c {
            '|' | '\\' | '#' => out.push_str(&format!("#{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('|');
    out
}

fn nary(op: &str, terms: &[SmtTerm], empty: &str) -> String {
    match terms {
        [] => empty.to_string(),
        [single] => to_smtlib(single),
        _ => {
            let inner: Vec<String> = terms.iter().map(to_smtlib).collect();
            format!("({op} {})", inner.join(" "))
        }
    }
}

/// Print an SmtTerm as SMT-LIB2 format.
pub fn to_smtlib(term: &SmtTerm) -> String {
    match term {
        SmtTerm::Var(name) => symbol(name),
        SmtTerm::IntLit(n) => {
            if *n < 0 {
                format!("(- {})", n.unsigned_abs())
            } else {
                n.to_string()
            }
        }
        SmtTerm::BoolLit(b) => b.to_string(),
        SmtTerm::Add(lhs, rhs) => format!("(+ {} {})", to_smtlib(lhs), to_smtlib(rhs)),
        SmtTerm::Sub(lhs, rhs) => format!("(- {} {})", to_smtlib(lhs), to_smtlib(rhs)),
        SmtTerm::Eq(lhs, rhs) => format!("(= {} {})", to_smtlib(lhs), to_smtlib(rhs)),
        SmtTerm::Lt(lhs, rhs) => format!("(< {} {})", to_smtlib(lhs), to_smtlib(rhs)),
        SmtTerm::Le(lhs, rhs) => format!("(<= {} {})", to_smtlib(lhs), to_smtlib(rhs)),
        SmtTerm::Gt(lhs, rhs) => format!("(> {} {})", to_smtlib(lhs), to_smtlib(rhs)),
        SmtTerm::Ge(lhs, rhs) => format!("(>= {} {})", to_smtlib(lhs), to_smtlib(rhs)),
        SmtTerm::Distinct(terms) => {
            if terms.len() < 2 {
                "true".to_string()
            } else {
                let inner: Vec<String> = terms.iter().map(to_smtlib).collect();
                format!("(distinct {})", inner.join(" "))
            }
        }
        SmtTerm::And(terms) => nary("and", terms, "true"),
        SmtTerm::Or(terms) => nary("or", terms, "false"),
        SmtTerm::Not(inner) => format!("(not {})", to_smtlib(inner)),
        SmtTerm::Implies(lhs, rhs) => format!("(=> {} {})", to_smtlib(lhs), to_smtlib(rhs)),
        SmtTerm::Iff(lhs, rhs) => format!("(= {} {})", to_smtlib(lhs), to_smtlib(rhs)),
        SmtTerm::Ite(cond, then, els) => format!(
            "(ite {} {} {})",
            to_smtlib(cond),
            to_smtlib(then),
            to_smtlib(els)
        ),
    }
}

/// Print a sort as SMT-LIB2 format.
pub fn sort_to_smtlib(sort: &SmtSort) -> &'static str {
    match sort {
        SmtSort::Bool => "Bool",
        SmtSort::Int => "Int",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn print_simple_term() {
        let term = SmtTerm::var("x").add(SmtTerm::int(1)).ge(SmtTerm::int(0));
        assert_eq!(to_smtlib(&term), "(>= (+ x 1) 0)");
    }

    #[test]
    fn edge_variables_are_quoted() {
        let term = SmtTerm::var("po(1,2)").implies(SmtTerm::var("exec_1"));
        assert_eq!(to_smtlib(&term), "(=> |po(1,2)| exec_1)");
        assert_eq!(symbol("(po | rf)(0,3)"), "|(po #7c rf)(0,3)|");
        assert_eq!(symbol("1abc"), "|1abc|");
    }

    #[test]
    fn quoted_symbols_escape_reserved_characters() {
        let diff = symbol("(po \\ fencerel(Mfence))(2,4)");
        assert_eq!(diff, "|(po #5c fencerel(Mfence))(2,4)|");
        let body = &diff[1..diff.len() - 1];
        assert!(!body.contains('|') && !body.contains('\\'));

        let names = ["(a|b)", "(a_b)", "(a#7cb)", "(a\\b)", "(a#5cb)"];
        let printed: std::collections::HashSet<String> = names.iter().map(|n| symbol(n)).collect();
        assert_eq!(printed.len(), names.len());
    }

    #[test]
    fn negative_literals_and_degenerate_nary() {
        assert_eq!(to_smtlib(&SmtTerm::int(-5)), "(- 5)");
        assert_eq!(to_smtlib(&SmtTerm::and(vec![])), "true");
        assert_eq!(to_smtlib(&SmtTerm::or(vec![])), "false");
        assert_eq!(
            to_smtlib(&SmtTerm::Distinct(vec![SmtTerm::var("p"), SmtTerm::var("q")])),
            "(distinct p q)"
        );
    }
}
