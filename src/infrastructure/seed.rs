//! Demo data for local development.

use thiserror::Error;

use crate::domain::{
    PasswordHash, PasswordHashError, Project, ProjectId, Task, TaskId, TaskStatus, Timestamp,
    User, UserId, UserRole,
};
use crate::infrastructure::{Repositories, RepositoryError};

/// Login accounts created by [`seed_demo_data`]: `(name, email, password, role)`.
pub const DEMO_USERS: [(&str, &str, &str, UserRole); 3] = [
    ("Admin", "admin@demo.test", "Passw0rd!", UserRole::Admin),
    ("Alice", "alice@demo.test", "password123", UserRole::Member),
    ("Bob", "bob@demo.test", "password123", UserRole::Member),
];

#[derive(Debug, Error)]
pub enum SeedError {
    #[error(transparent)]
    Password(#[from] PasswordHashError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Name of the seeded project.
pub const DEMO_PROJECT_NAME: &str = "Website Redesign";

/// Populates the repositories with demo users, one project and three tasks.
///
/// Does nothing if the admin account already exists, so restarting a server
/// against a persistent database does not duplicate the data.
///
/// # Errors
///
/// Propagates any repository error, or a hashing error for an invalid
/// `password_cost`.
pub async fn seed_demo_data(repositories: &Repositories, password_cost: u32) -> Result<(), SeedError> {
    let (_, admin_email, _, _) = DEMO_USERS[0];
    if repositories
        .user_repository
        .find_by_email(admin_email)
        .await?
        .is_some()
    {
        tracing::debug!("Demo data already present, skipping seed");
        return Ok(());
    }

    let mut user_ids = Vec::with_capacity(DEMO_USERS.len());
    for (name, email, password, role) in DEMO_USERS {
        let password = PasswordHash::with_cost(password, password_cost)?;
        let user = User::new(UserId::generate(), name, email, password).with_role(role);
        repositories.user_repository.create(&user).await?;
        user_ids.push(user.user_id);
    }
    let alice = user_ids[1].clone();
    let bob = user_ids[2].clone();

    let now = Timestamp::now();
    let project = Project::new(ProjectId::generate(), DEMO_PROJECT_NAME, now)
        .with_description("Refresh the marketing site");
    repositories.project_repository.create(&project).await?;

    let tasks = [
        Task::new(TaskId::generate(), project.project_id.clone(), "Design homepage", now)
            .with_assignee(Some(alice.clone())),
        Task::new(TaskId::generate(), project.project_id.clone(), "Implement backend", now)
            .with_assignee(Some(bob))
            .with_status(TaskStatus::InProgress),
        Task::new(TaskId::generate(), project.project_id.clone(), "Write documentation", now)
            .with_assignee(Some(alice)),
    ];
    for task in &tasks {
        repositories.task_repository.create(task).await?;
    }

    tracing::info!(
        users = DEMO_USERS.len(),
        tasks = tasks.len(),
        project_id = %project.project_id,
        "Seeded demo data"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MIN_PASSWORD_COST;
    use crate::infrastructure::{RepositoryFactory, TaskFilter};
    use rstest::rstest;

    #[rstest]
    #[tokio::test]
    async fn test_seed_demo_data_is_idempotent() {
        let repositories = RepositoryFactory::in_memory();

        seed_demo_data(&repositories, MIN_PASSWORD_COST).await.unwrap();
        seed_demo_data(&repositories, MIN_PASSWORD_COST).await.unwrap();

        let projects = repositories.project_repository.search(None).await.unwrap();
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].name, DEMO_PROJECT_NAME);

        let tasks = repositories
            .task_repository
            .list(&TaskFilter::for_project(projects[0].project_id.clone()))
            .await
            .unwrap();
        assert_eq!(tasks.len(), 3);
        assert!(tasks.iter().all(|task| task.version == 0));
    }

    #[rstest]
    #[tokio::test]
    async fn test_seeded_users_can_be_verified() {
        let repositories = RepositoryFactory::in_memory();
        seed_demo_data(&repositories, MIN_PASSWORD_COST).await.unwrap();

        let alice = repositories
            .user_repository
            .find_by_email("alice@demo.test")
            .await
            .unwrap()
            .unwrap();

        assert!(alice.password.verify("password123"));
        assert_eq!(alice.role, UserRole::Member);
    }

    #[rstest]
    #[tokio::test]
    async fn test_seeded_admin_has_admin_role() {
        let repositories = RepositoryFactory::in_memory();
        seed_demo_data(&repositories, MIN_PASSWORD_COST).await.unwrap();

        let admin = repositories
            .user_repository
            .find_by_email("admin@demo.test")
            .await
            .unwrap()
            .unwrap();

        assert!(admin.role.is_admin());
    }

    #[rstest]
    #[tokio::test]
    async fn test_invalid_password_cost_is_reported() {
        let repositories = RepositoryFactory::in_memory();

        let result = seed_demo_data(&repositories, 99).await;

        assert!(matches!(result, Err(SeedError::Password(_))));
    }
}
