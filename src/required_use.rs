use std::{fmt, iter, mem};

use itertools::Itertools;
use tracing::trace;

use crate::eapi::{Eapi, Feature};
use crate::set::FlagSet;
use crate::Error;

/// REQUIRED_USE group operator.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum Operator {
    AnyOf,
    ExactlyOneOf,
    AtMostOneOf,
    /// USE conditional such as `foo?` or `!foo?`.
    Conditional(String),
}

impl Operator {
    fn parse(token: &str, eapi: &'static Eapi) -> crate::Result<Option<Self>> {
        let op = match token {
            "||" => Self::AnyOf,
            "^^" => Self::ExactlyOneOf,
            "??" if eapi.has(Feature::RequiredUseAtMostOneOf) => Self::AtMostOneOf,
            "??" => {
                return Err(Error::Eapi(
                    "at-most-one-of groups are supported in >= EAPI 5".to_string(),
                ))
            }
            s if s.ends_with('?') => Self::Conditional(s.to_string()),
            _ => return Ok(None),
        };
        Ok(Some(op))
    }

    /// Return true for the operators that combine their children's states.
    pub fn is_group(&self) -> bool {
        !matches!(self, Self::Conditional(_))
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::AnyOf => write!(f, "||"),
            Self::ExactlyOneOf => write!(f, "^^"),
            Self::AtMostOneOf => write!(f, "??"),
            Self::Conditional(s) => write!(f, "{s}"),
        }
    }
}

#[derive(Debug, Clone)]
enum Child {
    Leaf { token: String, satisfied: bool },
    Branch(usize),
}

#[derive(Debug, Default, Clone)]
struct Branch {
    op: Option<Operator>,
    parent: Option<usize>,
    children: Vec<Child>,
    satisfied: bool,
}

/// Evaluated REQUIRED_USE constraint tree.
///
/// Its string form contains only the unsatisfied parts of the constraint, keeping all
/// children of any-of, exactly-one-of, and at-most-one-of groups for context.
#[derive(Debug, Clone)]
pub struct RequiredUse {
    nodes: Vec<Branch>,
}

impl RequiredUse {
    pub fn is_satisfied(&self) -> bool {
        self.nodes[0].satisfied
    }

    fn is_group(&self, id: usize) -> bool {
        self.nodes[id].op.as_ref().map_or(false, Operator::is_group)
    }

    fn render(&self, id: usize) -> String {
        let branch = &self.nodes[id];
        let parens = branch.parent.is_some();
        let complex = iter::successors(Some(id), |&i| self.nodes[i].parent).any(|i| self.is_group(i));

        let children = branch.children.iter().filter_map(|child| match child {
            Child::Leaf { token, satisfied } if complex || !satisfied => Some(token.clone()),
            Child::Branch(c) if complex || !self.nodes[*c].satisfied => Some(self.render(*c)),
            _ => None,
        });

        branch
            .op
            .iter()
            .map(|op| op.to_string())
            .chain(parens.then(|| "(".to_string()))
            .chain(children)
            .chain(parens.then(|| ")".to_string()))
            .join(" ")
    }
}

impl fmt::Display for RequiredUse {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.render(0))
    }
}

enum Item {
    Op(Operator),
    Value(bool),
}

struct Evaluator<'a> {
    use_flags: &'a FlagSet,
    iuse_match: &'a dyn Fn(&str) -> bool,
    eapi: &'static Eapi,
    nodes: Vec<Branch>,
}

impl Evaluator<'_> {
    fn is_active(&self, token: &str) -> crate::Result<bool> {
        let (flag, negated) = match token.strip_prefix('!') {
            Some(flag) => (flag, true),
            None => (token, false),
        };
        if flag.is_empty() || !(self.iuse_match)(flag) {
            return Err(Error::UnknownFlag(format!("USE flag '{flag}' is not in IUSE")));
        }
        Ok(self.use_flags.contains(flag) != negated)
    }

    fn is_satisfied(&self, op: &Operator, args: &[bool]) -> bool {
        if args.is_empty() && self.eapi.has(Feature::EmptyGroupsAlwaysTrue) {
            return true;
        }
        let enabled = args.iter().filter(|&&x| x).count();
        match op {
            Operator::AnyOf => enabled > 0,
            Operator::ExactlyOneOf => enabled == 1,
            Operator::AtMostOneOf => enabled <= 1,
            Operator::Conditional(_) => enabled == args.len(),
        }
    }

    fn parent(&self, id: usize) -> crate::Result<usize> {
        self.nodes[id]
            .parent
            .ok_or_else(|| Error::malformed("unbalanced REQUIRED_USE group"))
    }

    fn add_branch(&mut self, op: Option<Operator>, parent: usize) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Branch { op, parent: Some(parent), ..Default::default() });
        self.nodes[parent].children.push(Child::Branch(id));
        id
    }

    /// Remove a branch from its parent, it must be the parent's last child.
    fn detach(&mut self, id: usize, parent: usize) {
        let last = self.nodes[parent].children.pop();
        debug_assert!(
            matches!(last, Some(Child::Branch(x)) if x == id),
            "node is not last child of parent"
        );
    }

    /// Move the children of a branch into its parent.
    fn splice(&mut self, id: usize, parent: usize) {
        let children = mem::take(&mut self.nodes[id].children);
        for child in &children {
            if let Child::Branch(c) = child {
                self.nodes[*c].parent = Some(parent);
            }
        }
        self.nodes[parent].children.extend(children);
    }

    fn evaluate(mut self, s: &str) -> crate::Result<RequiredUse> {
        let malformed = || Error::malformed(format!("malformed syntax: '{s}'"));
        let mut stack: Vec<Vec<Item>> = vec![vec![]];
        let mut node = 0;
        let mut need_bracket = false;
        self.nodes.push(Branch::default());

        for token in s.split_whitespace() {
            match token {
                "(" => {
                    if !need_bracket {
                        node = self.add_branch(None, node);
                    }
                    need_bracket = false;
                    stack.push(vec![]);
                }
                ")" => {
                    if need_bracket {
                        return Err(malformed());
                    }
                    let l = match stack.pop() {
                        Some(l) if !stack.is_empty() => l,
                        _ => return Err(malformed()),
                    };
                    let level = stack.len() - 1;
                    let args: Vec<_> = l
                        .iter()
                        .filter_map(|x| match x {
                            Item::Value(val) => Some(*val),
                            Item::Op(_) => None,
                        })
                        .collect();

                    let op = match stack[level].pop() {
                        Some(Item::Op(op)) => Some(op),
                        Some(item) => {
                            stack[level].push(item);
                            None
                        }
                        None => None,
                    };
                    let parent = self.parent(node)?;

                    if let Some(op) = &op {
                        if let Operator::Conditional(cond) = op {
                            let flag = cond.strip_suffix('?').unwrap_or(cond.as_str());
                            if !self.is_active(flag)? {
                                trace!("skipping inactive conditional {cond}");
                                self.nodes[node].satisfied = true;
                                self.detach(node, parent);
                                node = parent;
                                continue;
                            }
                        }
                        let satisfied = self.is_satisfied(op, &args);
                        stack[level].push(Item::Value(satisfied));
                        self.nodes[node].satisfied = satisfied;
                    }

                    let parent_is_group = self.nodes[parent]
                        .op
                        .as_ref()
                        .map_or(false, Operator::is_group);
                    match op {
                        None => {
                            let satisfied = args.iter().all(|&x| x);
                            self.nodes[node].satisfied = satisfied;
                            if !l.is_empty() {
                                stack[level].push(Item::Value(satisfied));
                            }
                            if self.nodes[node].children.len() <= 1 || !parent_is_group {
                                self.detach(node, parent);
                                self.splice(node, parent);
                            }
                        }
                        Some(_) if self.nodes[node].children.is_empty() => {
                            self.detach(node, parent);
                        }
                        Some(op) if op.is_group() && self.nodes[node].children.len() == 1 => {
                            // collapse single child groups into the parent
                            self.detach(node, parent);
                            let child = self.nodes[node].children.remove(0);
                            if let Child::Branch(c) = child {
                                self.nodes[c].parent = Some(parent);
                            }
                            self.nodes[parent].children.push(child.clone());
                            if let Child::Branch(c) = child {
                                if self.nodes[c].op.is_none() && !parent_is_group {
                                    self.detach(c, parent);
                                    self.splice(c, parent);
                                }
                            }
                        }
                        Some(_) => (),
                    }

                    node = parent;
                }
                _ => {
                    if need_bracket {
                        return Err(malformed());
                    }
                    let level = stack.len() - 1;
                    match Operator::parse(token, self.eapi)? {
                        Some(op) => {
                            need_bracket = true;
                            stack[level].push(Item::Op(op.clone()));
                            node = self.add_branch(Some(op), node);
                        }
                        None => {
                            let satisfied = self.is_active(token)?;
                            stack[level].push(Item::Value(satisfied));
                            self.nodes[node].children.push(Child::Leaf {
                                token: token.to_string(),
                                satisfied,
                            });
                        }
                    }
                }
            }
        }

        if stack.len() != 1 || need_bracket {
            return Err(malformed());
        }

        self.nodes[0].satisfied = stack[0]
            .iter()
            .all(|x| matches!(x, Item::Value(true)));
        Ok(RequiredUse { nodes: self.nodes })
    }
}

/// Evaluate a REQUIRED_USE string against the enabled flags.
///
/// All referenced flags must be accepted by `iuse_match`.
pub fn check_required_use(
    s: &str,
    use_flags: &FlagSet,
    iuse_match: &dyn Fn(&str) -> bool,
    eapi: &'static Eapi,
) -> crate::Result<RequiredUse> {
    let evaluator = Evaluator {
        use_flags,
        iuse_match,
        eapi,
        nodes: vec![],
    };
    evaluator.evaluate(s)
}

/// Return all USE flags referenced in a REQUIRED_USE string.
pub fn required_use_flags(s: &str, eapi: &'static Eapi) -> crate::Result<FlagSet> {
    let malformed = || Error::malformed(format!("malformed syntax: '{s}'"));
    let mut flags = FlagSet::new();
    let mut level = 0;
    let mut need_bracket = false;

    for token in s.split_whitespace() {
        match token {
            "(" => {
                need_bracket = false;
                level += 1;
            }
            ")" => {
                if need_bracket || level == 0 {
                    return Err(malformed());
                }
                level -= 1;
            }
            _ => {
                if need_bracket {
                    return Err(malformed());
                }
                let op = Operator::parse(token, eapi)?;
                need_bracket = op.is_some();
                if let None | Some(Operator::Conditional(_)) = op {
                    let flag = token.strip_suffix('?').unwrap_or(token);
                    flags.insert(flag.strip_prefix('!').unwrap_or(flag));
                }
            }
        }
    }

    if level != 0 || need_bracket {
        return Err(malformed());
    }
    Ok(flags)
}

/// Replace REQUIRED_USE operators with readable names.
pub fn human_readable(s: &str) -> String {
    s.replace("^^", "exactly-one-of")
        .replace("||", "any-of")
        .replace("??", "at-most-one-of")
}
