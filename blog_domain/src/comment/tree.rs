//! Reply trees are stored flat: every comment only knows its parent id.
//! [`ReplyIndex`] inverts those links so subtrees can be walked top-down.

use crate::CommentId;

use std::collections::{HashMap, HashSet};

#[derive(Default, Debug)]
pub struct ReplyIndex {
    children: HashMap<CommentId, Vec<CommentId>>,
    known: HashSet<CommentId>,
}

impl ReplyIndex {
    /// Build from `(comment, parent)` pairs, typically every comment of one post.
    pub fn new(links: impl IntoIterator<Item = (CommentId, Option<CommentId>)>) -> Self {
        let mut index = Self::default();
        for (comment_id, parent_id) in links {
            index.known.insert(comment_id);
            if let Some(parent_id) = parent_id {
                index.children.entry(parent_id).or_default().push(comment_id);
            }
        }
        index
    }

    pub fn contains(&self, comment_id: CommentId) -> bool {
        self.known.contains(&comment_id)
    }

    pub fn children(&self, comment_id: CommentId) -> &[CommentId] {
        self.children
            .get(&comment_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// `root` and all of its transitive replies, every reply listed before
    /// the comment it answers.
    pub fn subtree(&self, root: CommentId) -> Vec<CommentId> {
        self.cascade([root])
    }

    /// The union of several subtrees in deletion order.
    ///
    /// Roots that are unknown, or that already appeared inside an earlier
    /// root's subtree, contribute nothing, so no id is ever listed twice.
    pub fn cascade(&self, roots: impl IntoIterator<Item = CommentId>) -> Vec<CommentId> {
        let mut order = Vec::new();
        let mut seen = HashSet::new();
        // (comment, children already pushed)
        let mut stack: Vec<(CommentId, bool)> = Vec::new();

        for root in roots {
            if !self.contains(root) || !seen.insert(root) {
                continue;
            }
            stack.push((root, false));

            while let Some((comment_id, expanded)) = stack.pop() {
                if expanded {
                    order.push(comment_id);
                    continue;
                }
                stack.push((comment_id, true));
                for &child in self.children(comment_id) {
                    // A link cycle cannot be built through the engine, but a
                    // corrupted store must not send us round forever.
                    if seen.insert(child) {
                        stack.push((child, false));
                    }
                }
            }
        }

        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[i64]) -> Vec<CommentId> {
        raw.iter().copied().map(CommentId).collect()
    }

    fn position(order: &[CommentId], id: i64) -> usize {
        order
            .iter()
            .position(|c| *c == CommentId(id))
            .unwrap_or_else(|| panic!("{id} missing from {order:?}"))
    }

    ///
    /// 1
    /// ├── 2
    /// │   ├── 4
    /// │   └── 5
    /// │       └── 7
    /// └── 3
    /// 6
    ///
    fn forest() -> ReplyIndex {
        ReplyIndex::new([
            (CommentId(1), None),
            (CommentId(2), Some(CommentId(1))),
            (CommentId(3), Some(CommentId(1))),
            (CommentId(4), Some(CommentId(2))),
            (CommentId(5), Some(CommentId(2))),
            (CommentId(6), None),
            (CommentId(7), Some(CommentId(5))),
        ])
    }

    #[test]
    fn subtree_lists_descendants_before_ancestors() {
        let order = forest().subtree(CommentId(1));

        let mut sorted = order.clone();
        sorted.sort();
        assert_eq!(ids(&[1, 2, 3, 4, 5, 7]), sorted);

        assert!(position(&order, 7) < position(&order, 5));
        assert!(position(&order, 5) < position(&order, 2));
        assert!(position(&order, 4) < position(&order, 2));
        assert!(position(&order, 2) < position(&order, 1));
        assert!(position(&order, 3) < position(&order, 1));
        assert_eq!(CommentId(1), *order.last().unwrap());
    }

    #[test]
    fn subtree_of_leaf_is_the_leaf() {
        assert_eq!(ids(&[6]), forest().subtree(CommentId(6)));
    }

    #[test]
    fn subtree_of_unknown_comment_is_empty() {
        assert!(forest().subtree(CommentId(99)).is_empty());
    }

    #[test]
    fn cascade_skips_roots_already_covered() {
        let order = forest().cascade(ids(&[5, 1, 6, 7]));

        let mut sorted = order.clone();
        sorted.sort();
        assert_eq!(ids(&[1, 2, 3, 4, 5, 6, 7]), sorted);
    }

    #[test]
    fn deep_chain_does_not_recurse() {
        let depth = 100_000;
        let index = ReplyIndex::new(
            (1..=depth).map(|n| (CommentId(n), (n > 1).then(|| CommentId(n - 1)))),
        );

        let order = index.subtree(CommentId(1));

        assert_eq!(depth as usize, order.len());
        assert_eq!(CommentId(depth), order[0]);
        assert_eq!(CommentId(1), order[order.len() - 1]);
    }

    #[test]
    fn corrupted_cycle_terminates() {
        let index = ReplyIndex::new([
            (CommentId(1), Some(CommentId(2))),
            (CommentId(2), Some(CommentId(1))),
        ]);

        let mut order = index.subtree(CommentId(1));
        order.sort();
        assert_eq!(ids(&[1, 2]), order);
    }
}
