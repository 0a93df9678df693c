//! In-memory store for tests. Mirrors the Postgres constraints the auth layer relies on:
//! unique email and username, invitations removed with their user, single-use activation.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::{
    db::{
        errors::{DbError, Result},
        models::{
            invitations::{ActivationOutcome, InvitationCreateDBRequest, InvitationDBResponse},
            posts::{PostCreateDBRequest, PostDBResponse, PostUpdateDBRequest},
            roles::RoleDBResponse,
            users::{UserCreateDBRequest, UserDBResponse},
        },
        storage::{PostStore, RoleStore, UserStore},
    },
    types::{PostId, UserId},
};

#[derive(Default)]
struct Tables {
    roles: Vec<RoleDBResponse>,
    users: HashMap<UserId, UserDBResponse>,
    invitations: HashMap<String, InvitationDBResponse>,
    posts: HashMap<PostId, PostDBResponse>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    user_lookups: AtomicUsize,
    fail_user_deletes: AtomicBool,
}

impl MemoryStore {
    /// A store seeded with the same roles as the initial migration.
    pub fn new() -> Self {
        let store = Self::default();
        store.tables().roles = vec![
            role(1, "user", "A user can create posts and comments", 1),
            role(2, "moderator", "A moderator can update other users posts", 2),
            role(3, "admin", "An admin can update and delete other users posts", 3),
        ];
        store
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().expect("memory store lock poisoned")
    }

    pub fn user_count(&self) -> usize {
        self.tables().users.len()
    }

    pub fn invitation_count(&self) -> usize {
        self.tables().invitations.len()
    }

    /// How many times `get_by_id` has hit the store
    pub fn user_lookups(&self) -> usize {
        self.user_lookups.load(Ordering::SeqCst)
    }

    /// Make every subsequent user delete fail
    pub fn fail_user_deletes(&self) {
        self.fail_user_deletes.store(true, Ordering::SeqCst);
    }

    /// Insert an already-active user with the given role, bypassing registration
    pub fn insert_active_user(&self, username: &str, email: &str, password_hash: &str, role_name: &str) -> UserDBResponse {
        let mut tables = self.tables();
        let role = tables
            .roles
            .iter()
            .find(|r| r.name == role_name)
            .cloned()
            .expect("role is seeded");
        let user = UserDBResponse {
            id: uuid::Uuid::new_v4(),
            username: username.to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            is_active: true,
            created_at: Utc::now(),
            role_id: role.id,
            role_name: role.name,
            role_level: role.level,
        };
        tables.users.insert(user.id, user.clone());
        user
    }

    /// Move an invitation's expiry, e.g. into the past
    pub fn set_invitation_expiry(&self, token_digest: &str, expires_at: DateTime<Utc>) {
        if let Some(invitation) = self.tables().invitations.get_mut(token_digest) {
            invitation.expires_at = expires_at;
        }
    }

    pub fn invitation_digests(&self) -> Vec<String> {
        self.tables().invitations.keys().cloned().collect()
    }
}

fn role(id: i32, name: &str, description: &str, level: i32) -> RoleDBResponse {
    RoleDBResponse {
        id,
        name: name.to_string(),
        description: description.to_string(),
        level,
    }
}

fn unique_violation(constraint: &str) -> DbError {
    DbError::UniqueViolation {
        constraint: Some(constraint.to_string()),
        table: Some("users".to_string()),
        message: format!("duplicate key value violates unique constraint \"{constraint}\""),
    }
}

#[async_trait::async_trait]
impl UserStore for MemoryStore {
    async fn create_and_invite(&self, user: &UserCreateDBRequest, invitation: &InvitationCreateDBRequest) -> Result<UserDBResponse> {
        let mut tables = self.tables();

        if tables.users.values().any(|u| u.email == user.email) {
            return Err(unique_violation("users_email_key"));
        }
        if tables.users.values().any(|u| u.username == user.username) {
            return Err(unique_violation("users_username_key"));
        }
        let role = tables
            .roles
            .iter()
            .find(|r| r.name == user.role_name)
            .cloned()
            .ok_or_else(|| DbError::Other(anyhow::anyhow!("role {} does not exist", user.role_name)))?;

        let now = Utc::now();
        let created = UserDBResponse {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
            is_active: false,
            created_at: now,
            role_id: role.id,
            role_name: role.name,
            role_level: role.level,
        };
        tables.users.insert(created.id, created.clone());
        tables.invitations.insert(
            invitation.token_digest.clone(),
            InvitationDBResponse {
                token_digest: invitation.token_digest.clone(),
                user_id: created.id,
                expires_at: invitation.expires_at,
                created_at: now,
            },
        );

        Ok(created)
    }

    async fn get_by_id(&self, id: UserId) -> Result<Option<UserDBResponse>> {
        self.user_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.tables().users.get(&id).cloned())
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<UserDBResponse>> {
        Ok(self.tables().users.values().find(|u| u.email == email).cloned())
    }

    async fn activate(&self, token_digest: &str, now: DateTime<Utc>) -> Result<ActivationOutcome> {
        let mut tables = self.tables();

        let Some(invitation) = tables.invitations.get(token_digest).cloned() else {
            return Ok(ActivationOutcome::Invalid);
        };
        if invitation.expires_at <= now {
            return Ok(ActivationOutcome::Expired);
        }
        match tables.users.get_mut(&invitation.user_id) {
            Some(user) if !user.is_active => user.is_active = true,
            _ => return Ok(ActivationOutcome::Invalid),
        }
        tables.invitations.remove(token_digest);

        Ok(ActivationOutcome::Activated(invitation.user_id))
    }

    async fn delete(&self, id: UserId) -> Result<bool> {
        if self.fail_user_deletes.load(Ordering::SeqCst) {
            return Err(DbError::Other(anyhow::anyhow!("connection reset by peer")));
        }
        let mut tables = self.tables();
        tables.invitations.retain(|_, invitation| invitation.user_id != id);
        tables.posts.retain(|_, post| post.user_id != id);
        Ok(tables.users.remove(&id).is_some())
    }
}

#[async_trait::async_trait]
impl RoleStore for MemoryStore {
    async fn get_by_name(&self, name: &str) -> Result<Option<RoleDBResponse>> {
        Ok(self.tables().roles.iter().find(|r| r.name == name).cloned())
    }
}

#[async_trait::async_trait]
impl PostStore for MemoryStore {
    async fn create(&self, request: &PostCreateDBRequest) -> Result<PostDBResponse> {
        let mut tables = self.tables();
        if !tables.users.contains_key(&request.user_id) {
            return Err(DbError::ForeignKeyViolation {
                constraint: Some("posts_user_id_fkey".to_string()),
                table: Some("posts".to_string()),
                message: "insert or update on table \"posts\" violates foreign key constraint".to_string(),
            });
        }
        let now = Utc::now();
        let post = PostDBResponse {
            id: request.id,
            user_id: request.user_id,
            title: request.title.clone(),
            content: request.content.clone(),
            tags: request.tags.clone(),
            created_at: now,
            updated_at: now,
        };
        tables.posts.insert(post.id, post.clone());
        Ok(post)
    }

    async fn get_by_id(&self, id: PostId) -> Result<Option<PostDBResponse>> {
        Ok(self.tables().posts.get(&id).cloned())
    }

    async fn update(&self, id: PostId, request: &PostUpdateDBRequest) -> Result<Option<PostDBResponse>> {
        let mut tables = self.tables();
        let Some(post) = tables.posts.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(title) = &request.title {
            post.title = title.clone();
        }
        if let Some(content) = &request.content {
            post.content = content.clone();
        }
        post.updated_at = Utc::now();
        Ok(Some(post.clone()))
    }

    async fn delete(&self, id: PostId) -> Result<bool> {
        Ok(self.tables().posts.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;

    fn new_user(username: &str, email: &str) -> UserCreateDBRequest {
        UserCreateDBRequest {
            id: uuid::Uuid::new_v4(),
            username: username.to_string(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
            role_name: "user".to_string(),
        }
    }

    fn invitation(digest: &str) -> InvitationCreateDBRequest {
        InvitationCreateDBRequest {
            token_digest: digest.to_string(),
            expires_at: Utc::now() + Duration::hours(1),
        }
    }

    #[tokio::test]
    async fn test_duplicates_are_reported_per_field() {
        let store = MemoryStore::new();
        store
            .create_and_invite(&new_user("alice", "alice@x.com"), &invitation("d1"))
            .await
            .unwrap();

        let err = store
            .create_and_invite(&new_user("alice2", "alice@x.com"), &invitation("d2"))
            .await
            .unwrap_err();
        assert_eq!(err.duplicate_user_field(), Some(crate::db::errors::DuplicateField::Email));

        let err = store
            .create_and_invite(&new_user("alice", "other@x.com"), &invitation("d3"))
            .await
            .unwrap_err();
        assert_eq!(err.duplicate_user_field(), Some(crate::db::errors::DuplicateField::Username));

        assert_eq!(store.user_count(), 1);
        assert_eq!(store.invitation_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_activation_succeeds_once() {
        let store = Arc::new(MemoryStore::new());
        store
            .create_and_invite(&new_user("bob", "bob@x.com"), &invitation("digest"))
            .await
            .unwrap();

        let attempts = (0..8).map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.activate("digest", Utc::now()).await.unwrap() })
        });
        let mut outcomes = Vec::new();
        for attempt in attempts {
            outcomes.push(attempt.await.unwrap());
        }

        let activated = outcomes
            .iter()
            .filter(|o| matches!(o, ActivationOutcome::Activated(_)))
            .count();
        assert_eq!(activated, 1);
        assert_eq!(
            outcomes.iter().filter(|o| **o == ActivationOutcome::Invalid).count(),
            outcomes.len() - 1
        );
    }

    #[tokio::test]
    async fn test_delete_removes_invitation() {
        let store = MemoryStore::new();
        let user = store
            .create_and_invite(&new_user("carol", "carol@x.com"), &invitation("digest"))
            .await
            .unwrap();

        assert!(UserStore::delete(&store, user.id).await.unwrap());
        assert_eq!(store.invitation_count(), 0);
        assert_eq!(store.activate("digest", Utc::now()).await.unwrap(), ActivationOutcome::Invalid);
    }
}
