/// Assert an error result renders to a string matching a regex.
#[cfg(test)]
macro_rules! assert_err_re {
    ($res:expr, $re:expr) => {
        $crate::macros::assert_err_re!($res, $re, "")
    };
    ($res:expr, $re:expr, $msg:expr) => {{
        let err = $res.unwrap_err().to_string();
        let re = ::regex::Regex::new($re.as_ref()).unwrap();
        let context: &str = $msg.as_ref();
        let suffix = if context.is_empty() { String::new() } else { format!(": {context}") };
        assert!(re.is_match(&err), "{err:?} doesn't match {:?}{suffix}", re.as_str());
    }};
}
#[cfg(test)]
pub(crate) use assert_err_re;

/// Assert a captured log line matches a regex, requires `#[traced_test]`.
#[cfg(test)]
macro_rules! assert_logs_re {
    ($re:expr) => {{
        let re = ::regex::Regex::new($re.as_ref()).unwrap();
        logs_assert(|lines: &[&str]| {
            lines
                .iter()
                .any(|l| re.is_match(l))
                .then_some(())
                .ok_or_else(|| format!("no log line matches: {re}"))
        });
    }};
}
#[cfg(test)]
pub(crate) use assert_logs_re;

// Short-circuit an ordering comparison on inequality.
macro_rules! cmp_not_equal {
    ($cmp:expr) => {
        match $cmp {
            ::std::cmp::Ordering::Equal => (),
            ordering => return ordering,
        }
    };
    ($x:expr, $y:expr) => {
        $crate::macros::cmp_not_equal!($x.cmp($y))
    };
}
pub(crate) use cmp_not_equal;
