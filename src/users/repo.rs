use anyhow::Context;
use sqlx::{PgConnection, PgExecutor, PgPool};
use uuid::Uuid;

use super::repo_types::{NewUser, User, UserPatch};

const USER_COLUMNS: &str = "id, name, email, phone, password_hash, google_id, role, avatar, \
                            picture, is_email_verified, created_at, updated_at";

/// Outcome of an admin action that must leave at least one admin.
#[derive(Debug, PartialEq, Eq)]
pub enum AdminGuard<T> {
    Applied(T),
    NotFound,
    LastAdmin,
}

impl User {
    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(db)
            .await
            .context("find user by id")?;
        Ok(user)
    }

    /// Find a user by email.
    pub async fn find_by_email(db: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(db)
            .await
            .context("find user by email")?;
        Ok(user)
    }

    pub async fn find_by_phone(db: &PgPool, phone: &str) -> anyhow::Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE phone = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(phone)
            .fetch_optional(db)
            .await
            .context("find user by phone")?;
        Ok(user)
    }

    pub async fn exists_with_email_or_phone(
        db: &PgPool,
        email: &str,
        phone: &str,
    ) -> anyhow::Result<bool> {
        let found: bool = sqlx::query_scalar(
            r#"SELECT EXISTS (SELECT 1 FROM users WHERE email = $1 OR phone = $2)"#,
        )
        .bind(email)
        .bind(phone)
        .fetch_one(db)
        .await
        .context("check email/phone taken")?;
        Ok(found)
    }

    pub async fn create(db: &PgPool, new: NewUser) -> anyhow::Result<User> {
        let sql = format!(
            r#"
            INSERT INTO users (name, email, phone, password_hash, google_id, avatar, is_email_verified)
            VALUES ($1, $2, $3, $4, $5, COALESCE($6, ''), $7)
            RETURNING {USER_COLUMNS}
            "#
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(new.name)
            .bind(new.email)
            .bind(new.phone)
            .bind(new.password_hash)
            .bind(new.google_id)
            .bind(new.avatar)
            .bind(new.is_email_verified)
            .fetch_one(db)
            .await
            .context("insert user")?;
        Ok(user)
    }

    /// Attaches a Google identity to an existing account and marks its email verified.
    pub async fn link_google(
        db: &PgPool,
        id: Uuid,
        google_id: &str,
        avatar: Option<&str>,
    ) -> anyhow::Result<User> {
        let sql = format!(
            r#"
            UPDATE users
               SET google_id = $2,
                   avatar = COALESCE($3, avatar),
                   is_email_verified = TRUE,
                   updated_at = now()
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(google_id)
            .bind(avatar)
            .fetch_one(db)
            .await
            .context("link google account")?;
        Ok(user)
    }

    pub async fn update<'e>(
        db: impl PgExecutor<'e>,
        id: Uuid,
        patch: UserPatch,
    ) -> anyhow::Result<Option<User>> {
        let sql = format!(
            r#"
            UPDATE users
               SET name = COALESCE($2, name),
                   email = COALESCE($3, email),
                   phone = COALESCE($4, phone),
                   avatar = COALESCE($5, avatar),
                   role = COALESCE($6, role),
                   updated_at = now()
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(patch.name)
            .bind(patch.email)
            .bind(patch.phone)
            .bind(patch.avatar)
            .bind(patch.role)
            .fetch_optional(db)
            .await
            .context("update user")?;
        Ok(user)
    }

    pub async fn set_picture(db: &PgPool, id: Uuid, url: &str) -> anyhow::Result<Option<User>> {
        let sql = format!(
            "UPDATE users SET picture = $2, updated_at = now() WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(url)
            .fetch_optional(db)
            .await
            .context("set user picture")?;
        Ok(user)
    }

    pub async fn set_password(db: &PgPool, id: Uuid, password_hash: &str) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(db)
            .await
            .context("set password")?;
        Ok(())
    }

    pub async fn list_all(db: &PgPool) -> anyhow::Result<Vec<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC");
        let users = sqlx::query_as::<_, User>(&sql)
            .fetch_all(db)
            .await
            .context("list users")?;
        Ok(users)
    }

    /// Locks every admin row for the rest of the transaction and returns
    /// their ids. Concurrent guards on admins queue behind each other.
    async fn lock_admins(conn: &mut PgConnection) -> anyhow::Result<Vec<Uuid>> {
        let ids: Vec<Uuid> =
            sqlx::query_scalar("SELECT id FROM users WHERE role = $1 ORDER BY id FOR UPDATE")
                .bind(User::ROLE_ADMIN)
                .fetch_all(conn)
                .await
                .context("lock admins")?;
        Ok(ids)
    }

    /// Deletes the account unless it is the only remaining admin.
    pub async fn delete_guarded(db: &PgPool, id: Uuid) -> anyhow::Result<AdminGuard<()>> {
        let mut tx = db.begin().await.context("begin user delete")?;
        if Self::lock_admins(&mut *tx).await? == [id] {
            return Ok(AdminGuard::LastAdmin);
        }

        let deleted = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("delete user")?
            .rows_affected();
        tx.commit().await.context("commit user delete")?;

        Ok(if deleted > 0 {
            AdminGuard::Applied(())
        } else {
            AdminGuard::NotFound
        })
    }

    /// Applies an admin's edit. Demoting the only remaining admin is refused.
    pub async fn update_guarded(
        db: &PgPool,
        id: Uuid,
        patch: UserPatch,
    ) -> anyhow::Result<AdminGuard<User>> {
        let mut tx = db.begin().await.context("begin user update")?;
        let demoting = patch.role.is_some_and(|r| r != User::ROLE_ADMIN);
        if demoting && Self::lock_admins(&mut *tx).await? == [id] {
            return Ok(AdminGuard::LastAdmin);
        }

        let user = Self::update(&mut *tx, id, patch).await?;
        tx.commit().await.context("commit user update")?;
        Ok(user.map_or(AdminGuard::NotFound, AdminGuard::Applied))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::seed_user;

    async fn admin_count(db: &PgPool) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = 1")
            .fetch_one(db)
            .await
            .unwrap()
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn admins_deleting_each_other_leave_one_behind(db: PgPool) {
        let a = seed_user(&db, "a@shop.test", User::ROLE_ADMIN).await;
        let b = seed_user(&db, "b@shop.test", User::ROLE_ADMIN).await;

        let (first, second) =
            tokio::join!(User::delete_guarded(&db, a), User::delete_guarded(&db, b));
        let mut outcomes = vec![first.unwrap(), second.unwrap()];
        outcomes.sort_by_key(|o| matches!(o, AdminGuard::LastAdmin));
        assert_eq!(outcomes, vec![AdminGuard::Applied(()), AdminGuard::LastAdmin]);
        assert_eq!(admin_count(&db).await, 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn last_admin_cannot_be_demoted(db: PgPool) {
        let boss = seed_user(&db, "boss@shop.test", User::ROLE_ADMIN).await;
        let demote = || UserPatch {
            role: Some(User::ROLE_USER),
            ..Default::default()
        };

        let outcome = User::update_guarded(&db, boss, demote()).await.unwrap();
        assert!(matches!(outcome, AdminGuard::LastAdmin));

        let other = seed_user(&db, "deputy@shop.test", User::ROLE_ADMIN).await;
        match User::update_guarded(&db, boss, demote()).await.unwrap() {
            AdminGuard::Applied(user) => assert_eq!(user.role, User::ROLE_USER),
            unexpected => panic!("unexpected outcome {unexpected:?}"),
        }
        assert_eq!(
            User::delete_guarded(&db, other).await.unwrap(),
            AdminGuard::LastAdmin
        );
        assert_eq!(
            User::delete_guarded(&db, Uuid::new_v4()).await.unwrap(),
            AdminGuard::NotFound
        );
    }
}
