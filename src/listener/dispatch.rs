/**
 * Route Table Resolution
 *
 * This module defines the route trees handlers expose and the descent that
 * resolves the remaining segments of a dotted route against one.
 *
 * # Structure
 *
 * A node is either a terminal operation or a nested table, so a handler can
 * expose arbitrarily deep (but statically known, finite) trees:
 *
 * ```text
 * admin
 * ├── get_users            -> Operation
 * └── users                -> SubRoutes
 *     ├── delete           -> Operation
 *     └── set_level        -> Operation
 * ```
 *
 * # Atomicity
 *
 * Resolution either yields exactly one operation (plus the segments left
 * over for it) or exactly one [`RouteNotFound`]; it never partially
 * applies and never panics on bad input.
 */

/// The remaining route segments did not resolve to an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteNotFound;

/// One node of a handler's route tree
#[derive(Debug, Clone, Copy)]
pub enum RouteNode<T: Copy + 'static> {
    /// A terminal operation
    Operation(T),
    /// A nested table consulted with the next segment
    SubRoutes(&'static [(&'static str, RouteNode<T>)]),
}

/// A handler's exposed route tree
#[derive(Debug, Clone, Copy)]
pub struct RouteTable<T: Copy + 'static> {
    root: &'static [(&'static str, RouteNode<T>)],
}

impl<T: Copy> RouteTable<T> {
    /// Build a table over a static entry list
    pub const fn new(root: &'static [(&'static str, RouteNode<T>)]) -> Self {
        Self { root }
    }

    /// Resolve route segments to an operation
    ///
    /// Pops the first segment and indexes into the current table; descends
    /// while it finds nested tables, and returns the operation together
    /// with whatever segments remain after it.
    ///
    /// # Errors
    ///
    /// [`RouteNotFound`] when the segments run out while still pointing at
    /// a table, or a segment has no entry.
    pub fn resolve<'s>(&self, segments: &'s [&'s str]) -> Result<(T, &'s [&'s str]), RouteNotFound> {
        let mut table = self.root;
        let mut rest = segments;

        loop {
            let (segment, tail) = rest.split_first().ok_or(RouteNotFound)?;
            let node = table
                .iter()
                .find(|(name, _)| name == segment)
                .map(|(_, node)| node)
                .ok_or(RouteNotFound)?;

            match node {
                RouteNode::Operation(op) => return Ok((*op, tail)),
                RouteNode::SubRoutes(sub) => {
                    table = *sub;
                    rest = tail;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Op {
        List,
        Delete,
        SetLevel,
    }

    const TABLE: RouteTable<Op> = RouteTable::new(&[
        ("get_users", RouteNode::Operation(Op::List)),
        (
            "users",
            RouteNode::SubRoutes(&[
                ("delete", RouteNode::Operation(Op::Delete)),
                ("set_level", RouteNode::Operation(Op::SetLevel)),
            ]),
        ),
    ]);

    #[test]
    fn test_resolves_terminal_operation() {
        let (op, rest) = TABLE.resolve(&["get_users"]).unwrap();
        assert_eq!(op, Op::List);
        assert!(rest.is_empty());
    }

    #[test]
    fn test_resolves_nested_operation_with_empty_remainder() {
        let (op, rest) = TABLE.resolve(&["users", "delete"]).unwrap();
        assert_eq!(op, Op::Delete);
        assert_eq!(rest, &[] as &[&str]);
    }

    #[test]
    fn test_extra_segments_are_returned_to_the_operation() {
        let (op, rest) = TABLE.resolve(&["users", "set_level", "extra"]).unwrap();
        assert_eq!(op, Op::SetLevel);
        assert_eq!(rest, &["extra"]);
    }

    #[test]
    fn test_unknown_segment_is_not_found() {
        assert_eq!(TABLE.resolve(&["unknown", "delete"]), Err(RouteNotFound));
        assert_eq!(TABLE.resolve(&["users", "unknown"]), Err(RouteNotFound));
    }

    #[test]
    fn test_exhausted_segments_on_a_table_is_not_found() {
        // "users" alone still points at a table, not an operation
        assert_eq!(TABLE.resolve(&["users"]), Err(RouteNotFound));
        assert_eq!(TABLE.resolve(&[]), Err(RouteNotFound));
    }

    #[test]
    fn test_deep_nesting_resolves() {
        const DEEP: RouteTable<Op> = RouteTable::new(&[(
            "a",
            RouteNode::SubRoutes(&[(
                "b",
                RouteNode::SubRoutes(&[("c", RouteNode::Operation(Op::List))]),
            )]),
        )]);
        let (op, rest) = DEEP.resolve(&["a", "b", "c"]).unwrap();
        assert_eq!(op, Op::List);
        assert!(rest.is_empty());
    }
}
