//! Process-local store used when no database is configured.
//!
//! Every post owns a thread of comments behind its own reader/writer lock.
//! Mutations lock only the thread they touch, so readers of other posts never
//! wait on them. A locator map resolves a bare comment id to its post.

use blog_domain::comment::repo::*;
use blog_domain::comment::tree::ReplyIndex;
use blog_domain::error::{BlogError, BlogResult};
use blog_domain::timestamp::Timestamptz;
use blog_domain::{CommentId, PostId, UserId};

use entrait::*;
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Clone, Debug)]
pub struct User {
    pub user_id: UserId,
    pub name: String,
    pub email: String,
    pub is_admin: bool,
    pub avatar_path: Option<String>,
}

#[derive(Clone, Debug)]
struct Post {
    post_id: PostId,
    author_id: UserId,
}

#[derive(Clone, Debug)]
struct CommentRecord {
    comment_id: CommentId,
    post_id: PostId,
    parent_id: Option<CommentId>,
    text: String,
    author_id: UserId,
    created_at: Timestamptz,
    modified_at: Timestamptz,
}

#[derive(Default)]
struct Thread {
    comments: BTreeMap<CommentId, CommentRecord>,
}

impl Thread {
    fn reply_count(&self, comment_id: CommentId) -> i64 {
        self.comments
            .values()
            .filter(|c| c.parent_id == Some(comment_id))
            .count() as i64
    }

    /// Direct reply count of every comment that has replies, in one pass.
    fn reply_counts(&self) -> HashMap<CommentId, i64> {
        let mut counts = HashMap::new();
        for parent_id in self.comments.values().filter_map(|c| c.parent_id) {
            *counts.entry(parent_id).or_default() += 1;
        }
        counts
    }

    fn reply_index(&self) -> ReplyIndex {
        ReplyIndex::new(self.comments.values().map(|c| (c.comment_id, c.parent_id)))
    }
}

#[derive(Default)]
pub struct MemStore {
    users: RwLock<HashMap<UserId, User>>,
    posts: RwLock<BTreeMap<PostId, Post>>,
    threads: RwLock<HashMap<PostId, Arc<RwLock<Thread>>>>,
    locator: RwLock<HashMap<CommentId, PostId>>,
    last_user_id: AtomicI64,
    last_post_id: AtomicI64,
    last_comment_id: AtomicI64,
}

fn author_name(users: &HashMap<UserId, User>, author_id: UserId) -> &str {
    users
        .get(&author_id)
        .map(|author| author.name.as_str())
        .unwrap_or_default()
}

fn joined(users: &HashMap<UserId, User>, record: &CommentRecord, reply_count: i64) -> Comment {
    Comment {
        comment_id: record.comment_id,
        post_id: record.post_id,
        parent_id: record.parent_id,
        text: record.text.clone(),
        author_id: record.author_id,
        author_name: author_name(users, record.author_id).to_string(),
        author_avatar_path: users
            .get(&record.author_id)
            .and_then(|author| author.avatar_path.clone()),
        reply_count,
        created_at: record.created_at,
        modified_at: record.modified_at,
    }
}

fn matches_filter(filter: &Filter<'_>, record: &CommentRecord, author_name: &str) -> bool {
    match *filter {
        Filter::TopLevel { .. } => record.parent_id.is_none(),
        Filter::Replies { parent_id, .. } | Filter::RepliesOfAnyPost { parent_id } => {
            record.parent_id == Some(parent_id)
        }
        Filter::Search { term, .. } => {
            record.text.to_lowercase().contains(term)
                || author_name.to_lowercase().contains(term)
        }
        Filter::All => true,
    }
}

fn poisoned<T>(_: PoisonError<T>) -> BlogError {
    BlogError::Anyhow(anyhow::anyhow!("in-memory store lock poisoned"))
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Two users, two posts by the second user and one comment on each post.
    pub fn seeded(now: Timestamptz) -> BlogResult<Self> {
        let store = Self::new();

        let first = store.insert_user("first", "first@gmail.com", false)?;
        let second = store.insert_user("second", "second@gmail.com", false)?;
        let first_post = store.insert_post(second)?;
        let second_post = store.insert_post(second)?;

        store.insert(NewComment {
            post_id: first_post,
            parent_id: None,
            text: "Super post!",
            author_id: first,
            now,
        })?;
        store.insert(NewComment {
            post_id: second_post,
            parent_id: None,
            text: "Great !!!",
            author_id: second,
            now,
        })?;

        Ok(store)
    }

    pub fn insert_user(&self, name: &str, email: &str, is_admin: bool) -> BlogResult<UserId> {
        let user_id = UserId(self.last_user_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.users.write().map_err(poisoned)?.insert(
            user_id,
            User {
                user_id,
                name: name.to_string(),
                email: email.to_string(),
                is_admin,
                avatar_path: None,
            },
        );
        Ok(user_id)
    }

    pub fn find_user(&self, user_id: UserId) -> BlogResult<Option<User>> {
        Ok(self.users.read().map_err(poisoned)?.get(&user_id).cloned())
    }

    pub fn users(&self) -> BlogResult<Vec<User>> {
        let mut users: Vec<User> = self.users.read().map_err(poisoned)?.values().cloned().collect();
        users.sort_by_key(|user| user.user_id);
        Ok(users)
    }

    pub fn insert_post(&self, author_id: UserId) -> BlogResult<PostId> {
        let post_id = PostId(self.last_post_id.fetch_add(1, Ordering::SeqCst) + 1);

        // The thread exists before the post becomes visible.
        self.threads
            .write()
            .map_err(poisoned)?
            .insert(post_id, Default::default());
        self.posts
            .write()
            .map_err(poisoned)?
            .insert(post_id, Post { post_id, author_id });

        Ok(post_id)
    }

    fn thread(&self, post_id: PostId) -> BlogResult<Option<Arc<RwLock<Thread>>>> {
        Ok(self.threads.read().map_err(poisoned)?.get(&post_id).cloned())
    }

    fn all_threads(&self) -> BlogResult<Vec<Arc<RwLock<Thread>>>> {
        Ok(self.threads.read().map_err(poisoned)?.values().cloned().collect())
    }

    fn locate(&self, comment_id: CommentId) -> BlogResult<Option<PostId>> {
        Ok(self.locator.read().map_err(poisoned)?.get(&comment_id).copied())
    }

    fn insert(&self, new_comment: NewComment<'_>) -> BlogResult<Comment> {
        let thread = self
            .thread(new_comment.post_id)?
            .ok_or(BlogError::PostNotFound(new_comment.post_id))?;
        let mut thread = thread.write().map_err(poisoned)?;

        // A parent outside this thread is either gone or in another post.
        if let Some(parent_id) = new_comment.parent_id {
            if !thread.comments.contains_key(&parent_id) {
                return Err(match self.locate(parent_id)? {
                    Some(_) => BlogError::InvalidRelation {
                        parent_id,
                        post_id: new_comment.post_id,
                    },
                    None => BlogError::ParentNotFound(parent_id),
                });
            }
        }

        let comment_id = CommentId(self.last_comment_id.fetch_add(1, Ordering::SeqCst) + 1);
        let record = CommentRecord {
            comment_id,
            post_id: new_comment.post_id,
            parent_id: new_comment.parent_id,
            text: new_comment.text.to_string(),
            author_id: new_comment.author_id,
            created_at: new_comment.now,
            modified_at: new_comment.now,
        };
        // Nothing can answer a comment that did not exist yet.
        let comment = joined(&self.users.read().map_err(poisoned)?, &record, 0);

        self.locator
            .write()
            .map_err(poisoned)?
            .insert(comment_id, new_comment.post_id);
        thread.comments.insert(comment_id, record);

        Ok(comment)
    }

    fn view(&self, thread: &Thread, record: &CommentRecord) -> BlogResult<Comment> {
        let users = self.users.read().map_err(poisoned)?;
        Ok(joined(&users, record, thread.reply_count(record.comment_id)))
    }

    /// Filters and orders the bare records, then joins only the rows inside
    /// `window`. Every thread involved stays read-locked for the whole call.
    fn select(&self, filter: Filter<'_>, window: Window) -> BlogResult<Listing> {
        let threads: Vec<Arc<RwLock<Thread>>> = match filter {
            Filter::TopLevel { post_id }
            | Filter::Replies { post_id, .. }
            | Filter::Search { post_id, .. } => self.thread(post_id)?.into_iter().collect(),
            // Replies always live in their parent's post.
            Filter::RepliesOfAnyPost { parent_id } => match self.locate(parent_id)? {
                Some(post_id) => self.thread(post_id)?.into_iter().collect(),
                None => vec![],
            },
            Filter::All => self.all_threads()?,
        };
        let guards = threads
            .iter()
            .map(|thread| thread.read().map_err(poisoned))
            .collect::<BlogResult<Vec<_>>>()?;
        let users = self.users.read().map_err(poisoned)?;

        let mut matching: Vec<(&Thread, &CommentRecord)> = guards
            .iter()
            .flat_map(|thread| {
                let thread: &Thread = thread;
                thread.comments.values().map(move |record| (thread, record))
            })
            .filter(|(_, record)| {
                matches_filter(&filter, record, author_name(&users, record.author_id))
            })
            .collect();

        if filter.newest_first() {
            matching.sort_by_key(|(_, c)| (Reverse(c.created_at), c.comment_id));
        } else {
            matching.sort_by_key(|(_, c)| c.comment_id);
        }

        let total = matching.len() as i64;
        let mut reply_counts: HashMap<PostId, HashMap<CommentId, i64>> = HashMap::new();
        let comments = matching
            .into_iter()
            .skip(usize::try_from(window.offset).unwrap_or(usize::MAX))
            .take(usize::try_from(window.limit).unwrap_or_default())
            .map(|(thread, record)| {
                let reply_count = reply_counts
                    .entry(record.post_id)
                    .or_insert_with(|| thread.reply_counts())
                    .get(&record.comment_id)
                    .copied()
                    .unwrap_or_default();
                joined(&users, record, reply_count)
            })
            .collect();

        Ok(Listing { comments, total })
    }

    fn comment_ids_by_author(&self, author_id: UserId) -> BlogResult<Vec<CommentId>> {
        let mut ids = vec![];
        for thread in self.all_threads()? {
            let thread = thread.read().map_err(poisoned)?;
            ids.extend(
                thread
                    .comments
                    .values()
                    .filter(|c| c.author_id == author_id)
                    .map(|c| c.comment_id),
            );
        }
        ids.sort();
        Ok(ids)
    }

    /// Removes the subtrees of the roots `pick` chooses, under one write lock.
    fn remove_from_thread(
        &self,
        post_id: PostId,
        pick: impl FnOnce(&Thread) -> Vec<CommentId>,
    ) -> BlogResult<Vec<CommentId>> {
        let Some(thread) = self.thread(post_id)? else {
            return Ok(vec![]);
        };
        let mut thread = thread.write().map_err(poisoned)?;

        let roots = pick(&thread);
        let doomed = thread.reply_index().cascade(roots);
        for comment_id in &doomed {
            thread.comments.remove(comment_id);
        }

        let mut locator = self.locator.write().map_err(poisoned)?;
        for comment_id in &doomed {
            locator.remove(comment_id);
        }

        tracing::debug!(post_id = %post_id, removed = doomed.len(), "thread pruned");

        Ok(doomed)
    }
}

#[entrait]
pub trait GetMemStore {
    fn get_mem_store(&self) -> &MemStore;
}

impl GetMemStore for MemStore {
    fn get_mem_store(&self) -> &MemStore {
        self
    }
}

pub struct MemCommentRepo;

#[entrait]
impl blog_domain::comment::repo::CommentRepoImpl for MemCommentRepo {
    pub async fn insert_comment(
        deps: &impl GetMemStore,
        new_comment: NewComment<'_>,
    ) -> BlogResult<Comment> {
        deps.get_mem_store().insert(new_comment)
    }

    pub async fn find_comment(
        deps: &impl GetMemStore,
        comment_id: CommentId,
    ) -> BlogResult<Option<Comment>> {
        let store = deps.get_mem_store();
        let Some(post_id) = store.locate(comment_id)? else {
            return Ok(None);
        };
        let Some(thread) = store.thread(post_id)? else {
            return Ok(None);
        };
        let thread = thread.read().map_err(poisoned)?;

        thread
            .comments
            .get(&comment_id)
            .map(|record| store.view(&thread, record))
            .transpose()
    }

    pub async fn update_comment_text(
        deps: &impl GetMemStore,
        comment_id: CommentId,
        text: &str,
        modified_at: Timestamptz,
    ) -> BlogResult<Option<Comment>> {
        let store = deps.get_mem_store();
        let Some(post_id) = store.locate(comment_id)? else {
            return Ok(None);
        };
        let Some(thread) = store.thread(post_id)? else {
            return Ok(None);
        };
        let mut thread = thread.write().map_err(poisoned)?;

        let Some(record) = thread.comments.get_mut(&comment_id) else {
            return Ok(None);
        };
        record.text = text.to_string();
        record.modified_at = modified_at;
        let record = record.clone();

        store.view(&thread, &record).map(Some)
    }

    pub async fn select_comments(
        deps: &impl GetMemStore,
        filter: Filter<'_>,
        window: Window,
    ) -> BlogResult<Listing> {
        deps.get_mem_store().select(filter, window)
    }

    pub async fn select_comment_ids_by_author(
        deps: &impl GetMemStore,
        author_id: UserId,
    ) -> BlogResult<Vec<CommentId>> {
        deps.get_mem_store().comment_ids_by_author(author_id)
    }

    pub async fn delete_comment_trees(
        deps: &impl GetMemStore,
        roots: &[CommentId],
    ) -> BlogResult<Vec<CommentId>> {
        let store = deps.get_mem_store();

        let mut roots_by_post: BTreeMap<PostId, Vec<CommentId>> = BTreeMap::new();
        for &root in roots {
            if let Some(post_id) = store.locate(root)? {
                roots_by_post.entry(post_id).or_default().push(root);
            }
        }

        let mut removed = vec![];
        for (post_id, roots) in roots_by_post {
            removed.extend(store.remove_from_thread(post_id, |_| roots)?);
        }

        Ok(removed)
    }

    pub async fn delete_post_comments(
        deps: &impl GetMemStore,
        post_id: PostId,
    ) -> BlogResult<Vec<CommentId>> {
        // Parents have lower ids than their replies, so walking in id order
        // reaches every top-level comment before any of its descendants.
        deps.get_mem_store()
            .remove_from_thread(post_id, |thread| thread.comments.keys().copied().collect())
    }
}

pub struct MemPostRepo;

#[entrait]
impl blog_domain::post::PostRepoImpl for MemPostRepo {
    pub async fn post_exists(deps: &impl GetMemStore, post_id: PostId) -> BlogResult<bool> {
        Ok(deps
            .get_mem_store()
            .posts
            .read()
            .map_err(poisoned)?
            .contains_key(&post_id))
    }

    pub async fn find_post_owner(
        deps: &impl GetMemStore,
        post_id: PostId,
    ) -> BlogResult<Option<UserId>> {
        Ok(deps
            .get_mem_store()
            .posts
            .read()
            .map_err(poisoned)?
            .get(&post_id)
            .map(|post| post.author_id))
    }

    pub async fn select_post_ids_by_owner(
        deps: &impl GetMemStore,
        owner: UserId,
    ) -> BlogResult<Vec<PostId>> {
        Ok(deps
            .get_mem_store()
            .posts
            .read()
            .map_err(poisoned)?
            .values()
            .filter(|post| post.author_id == owner)
            .map(|post| post.post_id)
            .collect())
    }
}
