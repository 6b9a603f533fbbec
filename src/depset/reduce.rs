use std::iter;

use tracing::trace;

use crate::atom::valid_flag;
use crate::eapi::Feature;
use crate::set::FlagSet;
use crate::Error;

use super::{paren_enclose, parse_tree, DepNode, DepToken, DepTree, ReduceOptions, EMPTY_ANY_OF};

type Stack<T> = Vec<Vec<DepNode<T>>>;

/// Reduce a dependency string into a tree, evaluating USE conditionals.
///
/// Redundant brackets are removed and conditionals are replaced by their contents when
/// active or dropped otherwise.
pub fn use_reduce<T: DepToken>(s: &str, opts: &ReduceOptions) -> crate::Result<DepTree<T>> {
    Reducer { opts, is_valid_flag: None }.reduce(s)
}

/// Reduce a dependency string, failing on conditionals referencing flags not accepted by
/// `is_valid_flag`.
pub fn use_reduce_with<T: DepToken>(
    s: &str,
    opts: &ReduceOptions,
    is_valid_flag: &dyn Fn(&str) -> bool,
) -> crate::Result<DepTree<T>> {
    Reducer { opts, is_valid_flag: Some(is_valid_flag) }.reduce(s)
}

fn push<T>(stack: &mut Stack<T>, node: DepNode<T>) {
    if let Some(level) = stack.last_mut() {
        level.push(node);
    }
}

fn ends_in_any_of<T>(stack: &[Vec<DepNode<T>>], k: Option<usize>) -> bool {
    k.and_then(|k| stack[k].last())
        .map_or(false, DepNode::is_any_of)
}

/// Return the closest level with a pending `||` that isn't shadowed by a plain token.
fn last_any_of_level<T>(stack: &[Vec<DepNode<T>>], k: Option<usize>) -> Option<usize> {
    (0..=k?)
        .rev()
        .find_map(|k| match stack[k].last() {
            Some(DepNode::AnyOf) => Some(Some(k)),
            Some(DepNode::Token(_) | DepNode::Arrow) => Some(None),
            _ => None,
        })
        .flatten()
}

fn group_vals<T>(node: Option<DepNode<T>>) -> Vec<DepNode<T>> {
    match node {
        Some(DepNode::Group(vals)) => vals,
        Some(node) => vec![node],
        None => vec![],
    }
}

fn any_of<T>(vals: Vec<DepNode<T>>) -> DepNode<T> {
    DepNode::Group(iter::once(DepNode::AnyOf).chain(vals).collect())
}

fn missing_whitespace_check(token: &str, pos: usize) -> crate::Result<()> {
    for x in [")", "(", "||"] {
        if token.starts_with(x) || token.ends_with(x) {
            return Err(Error::dep_string(
                format!("missing whitespace around '{x}' at '{token}'"),
                pos,
            ));
        }
    }
    Ok(())
}

struct Reducer<'a> {
    opts: &'a ReduceOptions,
    is_valid_flag: Option<&'a dyn Fn(&str) -> bool>,
}

impl Reducer<'_> {
    /// Determine if a USE conditional such as `foo?` or `!foo?` holds.
    fn is_active(&self, cond: &str) -> crate::Result<bool> {
        let (flag, negated) = match cond.strip_prefix('!') {
            Some(flag) => (flag, true),
            None => (cond, false),
        };
        let flag = flag.strip_suffix('?').unwrap_or(flag);

        match self.is_valid_flag {
            Some(is_valid) if !is_valid(flag) => {
                return Err(Error::UnknownFlag(format!(
                    "USE flag '{flag}' referenced in conditional '{cond}' is not in IUSE"
                )))
            }
            None if !valid_flag(flag) => {
                return Err(Error::malformed(format!(
                    "invalid USE flag '{flag}' in conditional '{cond}'"
                )))
            }
            _ => (),
        }

        let opts = self.opts;
        let active = if negated && opts.excludeall.contains(flag) {
            false
        } else if opts.masked.contains(flag) {
            negated
        } else if opts.matchall {
            true
        } else if opts.matchnone {
            false
        } else {
            opts.use_flags.contains(flag) != negated
        };
        Ok(active)
    }

    /// Keep only the branches nested under active conditionals on flags in the subset.
    fn select_subset(
        &self,
        nodes: Vec<DepNode<String>>,
        disjunction: bool,
        selected: bool,
        subset: &FlagSet,
    ) -> crate::Result<Vec<DepNode<String>>> {
        let mut result = vec![];
        let push = |result: &mut Vec<_>, children: Vec<_>| {
            if !disjunction {
                result.extend(children);
            } else if !children.is_empty() {
                result.push(DepNode::Group(children));
            }
        };

        let mut nodes = nodes.into_iter();
        while let Some(node) = nodes.next() {
            match node {
                DepNode::Group(vals) => {
                    let children = self.select_subset(vals, false, selected, subset)?;
                    push(&mut result, children);
                }
                DepNode::Conditional(cond) => {
                    let children = group_vals(nodes.next());
                    if self.is_active(&cond)? {
                        let flag = cond.strip_suffix('?').unwrap_or(cond.as_str());
                        let selected = selected || subset.contains(flag);
                        let children = self.select_subset(children, false, selected, subset)?;
                        push(&mut result, children);
                    }
                }
                DepNode::AnyOf => {
                    let children =
                        self.select_subset(group_vals(nodes.next()), true, selected, subset)?;
                    if disjunction {
                        result.extend(children);
                    } else if !children.is_empty() {
                        result.push(DepNode::AnyOf);
                        result.push(DepNode::Group(children));
                    }
                }
                node if selected => result.push(node),
                _ => (),
            }
        }

        Ok(result)
    }

    fn reduce<T: DepToken>(&self, s: &str) -> crate::Result<DepTree<T>> {
        let opts = self.opts;
        let eapi = opts.eapi;
        if opts.opconvert && opts.flat {
            return Err(Error::InvalidValue(
                "opconvert and flat are mutually exclusive".to_string(),
            ));
        }
        if opts.matchall && opts.matchnone {
            return Err(Error::InvalidValue(
                "matchall and matchnone are mutually exclusive".to_string(),
            ));
        }
        if opts.src_uri && !T::PLAIN_TEXT {
            return Err(Error::InvalidValue(
                "SRC_URI must be reduced to plain tokens".to_string(),
            ));
        }

        let subset_str;
        let s = match &opts.subset {
            Some(subset) => {
                let tree = parse_tree(s)?;
                let nodes = self.select_subset(tree.into_nodes(), false, false, subset)?;
                subset_str = paren_enclose(&nodes, false, false);
                trace!("subset {subset} selected: {subset_str:?}");
                subset_str.as_str()
            }
            None => s,
        };

        let tokens: Vec<_> = s.split_whitespace().collect();
        let mut stack: Stack<T> = vec![vec![]];
        // set after conditionals and `||`, requiring a following `(`
        let mut need_bracket = false;
        // set after SRC_URI arrows, requiring a following file name
        let mut need_simple_token = false;

        for (i, &token) in tokens.iter().enumerate() {
            let pos = i + 1;
            let expected_file = || {
                Error::dep_string(format!("expected: file name, got: '{token}'"), pos)
            };
            let expected_paren =
                || Error::dep_string(format!("expected: '(', got: '{token}'"), pos);

            match token {
                "(" => {
                    if need_simple_token {
                        return Err(expected_file());
                    }
                    if tokens.get(i + 1) == Some(&")") {
                        return Err(Error::dep_string(
                            "expected: dependency string, got: ')'",
                            pos,
                        ));
                    }
                    need_bracket = false;
                    stack.push(vec![]);
                }
                ")" => {
                    if need_bracket {
                        return Err(expected_paren());
                    }
                    if need_simple_token {
                        return Err(expected_file());
                    }
                    let l = match stack.pop() {
                        Some(l) if !stack.is_empty() => l,
                        _ => return Err(Error::dep_string("no matching '(' for ')'", pos)),
                    };
                    self.close_group(&mut stack, l)?;
                }
                "||" => {
                    if opts.src_uri {
                        return Err(Error::dep_string(
                            "any-of dependencies are not allowed in SRC_URI",
                            pos,
                        ));
                    }
                    if need_bracket {
                        return Err(expected_paren());
                    }
                    need_bracket = true;
                    push(&mut stack, DepNode::AnyOf);
                }
                "->" => {
                    if need_simple_token {
                        return Err(expected_file());
                    }
                    if !opts.src_uri {
                        return Err(Error::dep_string(
                            "SRC_URI arrows are only allowed in SRC_URI",
                            pos,
                        ));
                    }
                    if !eapi.has(Feature::SrcUriArrows) {
                        return Err(Error::dep_string(
                            "SRC_URI arrows are not allowed in this EAPI",
                            pos,
                        ));
                    }
                    need_simple_token = true;
                    push(&mut stack, DepNode::Arrow);
                }
                _ => {
                    if need_bracket {
                        return Err(expected_paren());
                    }
                    if need_simple_token && token.contains('/') {
                        return Err(expected_file());
                    }

                    let node = if token.ends_with('?') {
                        need_bracket = true;
                        DepNode::Conditional(token.to_string())
                    } else {
                        need_simple_token = false;
                        if opts.src_uri
                            && !eapi.has(Feature::SelectiveSrcUriRestriction)
                            && (token.starts_with("fetch+") || token.starts_with("mirror+"))
                        {
                            return Err(Error::dep_string(
                                "selective fetch/mirror restriction is not allowed in this EAPI",
                                pos,
                            ));
                        }

                        let dep = match T::from_token(token, eapi, self.is_valid_flag) {
                            Ok(dep) => dep,
                            Err(e) if e.is_unknown_flag() => return Err(e),
                            Err(e) => {
                                missing_whitespace_check(token, pos)?;
                                let msg = match e {
                                    Error::PegParse(_) => format!("invalid atom: {token:?}"),
                                    e => e.to_string(),
                                };
                                return Err(Error::dep_string(msg, pos));
                            }
                        };
                        match opts.matchall {
                            true => DepNode::Token(dep),
                            false => DepNode::Token(dep.evaluate(&opts.use_flags)),
                        }
                    };
                    push(&mut stack, node);
                }
            }
        }

        if stack.len() > 1 {
            return Err(Error::malformed("missing ')' at end of string"));
        }
        if need_bracket {
            return Err(Error::malformed("missing '(' at end of string"));
        }
        if need_simple_token {
            return Err(Error::malformed("missing file name at end of string"));
        }

        let nodes = stack.pop().unwrap_or_default();
        Ok(DepTree::new(nodes, opts.opconvert))
    }

    /// Merge a closed group into its parent level, removing redundant brackets.
    fn close_group<T: DepToken>(
        &self,
        stack: &mut Stack<T>,
        mut l: Vec<DepNode<T>>,
    ) -> crate::Result<()> {
        let opts = self.opts;
        let level = stack.len() - 1;
        let prev = level.checked_sub(1);
        let is_single = l.len() == 1
            || (opts.opconvert && l.first().map_or(false, DepNode::is_any_of))
            || (!opts.opconvert && l.len() == 2 && l[0].is_any_of());

        if opts.flat {
            if let Some(DepNode::Conditional(cond)) = stack[level].last() {
                let active = self.is_active(cond)?;
                stack[level].pop();
                if active {
                    stack[level].extend(l);
                }
            } else {
                stack[level].extend(l);
            }
            return Ok(());
        }

        let mut ignore = false;
        match stack[level].last() {
            Some(DepNode::AnyOf) if l.is_empty() => {
                trace!("dropping empty any-of group at level {level}");
                if !opts.eapi.has(Feature::EmptyGroupsAlwaysTrue) {
                    l.push(DepNode::Token(T::from_token(EMPTY_ANY_OF, opts.eapi, None)?));
                }
                stack[level].pop();
            }
            Some(DepNode::Conditional(cond)) => {
                ignore = !self.is_active(cond)?;
                if ignore {
                    trace!("ignoring group under inactive conditional {cond}");
                }
                stack[level].pop();
            }
            _ => (),
        }

        if l.is_empty() || ignore {
            return Ok(());
        }

        if !ends_in_any_of(stack, prev) && !ends_in_any_of(stack, Some(level)) {
            // ( ( ... ) ) -> ( ... )
            stack[level].extend(l);
        } else if stack[level].is_empty() {
            // an any-of at the level above requires keeping the brackets
            self.special_append(stack, l, is_single);
        } else if is_single && ends_in_any_of(stack, Some(level)) {
            // || ( A ) -> A, || ( || ( ... ) ) -> || ( ... )
            stack[level].pop();
            self.special_append(stack, l, is_single);
        } else if ends_in_any_of(stack, Some(level)) && ends_in_any_of(stack, prev) {
            // || ( A || ( B C ) ) -> || ( A B C )
            stack[level].pop();
            stack[level].extend(l);
        } else if opts.opconvert && ends_in_any_of(stack, Some(level)) {
            stack[level].pop();
            stack[level].push(any_of(l));
        } else {
            self.special_append(stack, l, is_single);
        }

        trace!("level {level}: {}", paren_enclose(&stack[level], false, opts.opconvert));
        Ok(())
    }

    /// Extend the current level instead of appending a group when the group is redundant.
    fn special_append<T>(&self, stack: &mut Stack<T>, l: Vec<DepNode<T>>, is_single: bool) {
        let opconvert = self.opts.opconvert;
        let level = stack.len() - 1;
        let prev = level.checked_sub(1);

        if !is_single {
            if opconvert && ends_in_any_of(stack, Some(level)) {
                stack[level].pop();
                stack[level].push(any_of(l));
            } else {
                stack[level].push(DepNode::Group(l));
            }
            return;
        }

        // either [A], [[...]], or [|| [...]]
        if l.first().map_or(false, DepNode::is_any_of) && ends_in_any_of(stack, prev) {
            let mut rest = l.into_iter().skip(1);
            if opconvert {
                stack[level].extend(rest);
            } else {
                stack[level].extend(group_vals(rest.next()));
            }
            return;
        }

        match <[_; 1]>::try_from(l) {
            Ok([DepNode::Group(inner)]) => {
                let inner_any_of = opconvert && inner.first().map_or(false, DepNode::is_any_of);
                match (last_any_of_level(stack, prev), inner_any_of) {
                    (None, true) => stack[level].push(DepNode::Group(inner)),
                    (None, false) => stack[level].extend(inner),
                    (Some(_), true) => stack[level].extend(inner.into_iter().skip(1)),
                    (Some(_), false) => stack[level].push(DepNode::Group(inner)),
                }
            }
            Ok([node]) => stack[level].push(node),
            Err(l) => stack[level].extend(l),
        }
    }
}
