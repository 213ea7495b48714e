//! Multi-client scenarios for the optimistic update controller.
//!
//! Two controllers stand in for two users sharing one task store. The
//! in-process scenarios talk to the repository directly; the last group runs
//! the same flow over HTTP against a server bound to an ephemeral port.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::post;
use rstest::rstest;
use tokio::net::TcpListener;

use common::{ADMIN_EMAIL, ADMIN_PASSWORD, TEST_SECRET, demo_project, demo_task, seeded_repositories};
use taskboard::api::{AppState, AuthConfig, CreateTaskRequest, login, router};
use taskboard::client::{
    ClientConfig, ControllerError, GatewayError, HttpTaskGateway, OptimisticUpdateController,
    RepositoryGateway, Session, SyncState, TaskGateway,
};
use taskboard::domain::{ProjectId, Task, TaskId, TaskPatch, TaskStatus, Timestamp};
use taskboard::infrastructure::{InMemoryTaskRepository, Repositories, TaskRepository};

const COMMIT_TIMEOUT: Duration = Duration::from_secs(5);

fn controller_over(repository: &Arc<InMemoryTaskRepository>) -> OptimisticUpdateController {
    let gateway: Arc<dyn TaskGateway> = Arc::new(RepositoryGateway::new(Arc::clone(repository) as Arc<dyn TaskRepository>));
    OptimisticUpdateController::new(gateway, COMMIT_TIMEOUT)
}

async fn shared_task(repository: &InMemoryTaskRepository) -> Task {
    let task = Task::new(TaskId::generate(), ProjectId::generate(), "Draft", Timestamp::now());
    repository.create(&task).await.unwrap();
    task
}

// =============================================================================
// In-Process Scenarios
// =============================================================================

#[rstest]
#[tokio::test]
async fn test_single_writer_commit_moves_task_to_version_one() {
    let repository = Arc::new(InMemoryTaskRepository::new());
    let task = shared_task(&repository).await;
    let client_a = controller_over(&repository);
    client_a.load(&task.project_id, None, None).await.unwrap();

    client_a
        .apply_local_edit(&task.task_id, TaskPatch::new().title("X"))
        .unwrap();
    let committed = client_a.commit(&task.task_id).await.unwrap();

    assert_eq!(committed.version, 1);
    assert_eq!(committed.title, "X");
    let stored = repository.find_by_id(&task.task_id).await.unwrap().unwrap();
    assert_eq!(client_a.visible_task(&task.task_id), Some(stored));
}

#[rstest]
#[tokio::test]
async fn test_second_writer_on_stale_version_loses_edit() {
    let repository = Arc::new(InMemoryTaskRepository::new());
    let task = shared_task(&repository).await;
    let client_a = controller_over(&repository);
    let client_b = controller_over(&repository);
    client_a.load(&task.project_id, None, None).await.unwrap();
    client_b.load(&task.project_id, None, None).await.unwrap();

    client_a
        .apply_local_edit(&task.task_id, TaskPatch::new().title("X"))
        .unwrap();
    client_a.commit(&task.task_id).await.unwrap();
    client_b
        .apply_local_edit(&task.task_id, TaskPatch::new().status(TaskStatus::Done))
        .unwrap();
    let result = client_b.commit(&task.task_id).await;

    assert_eq!(
        result,
        Err(ControllerError::EditLost {
            discarded: TaskPatch::new().status(TaskStatus::Done),
            current_version: 1,
        })
    );
    let seen_by_b = client_b.visible_task(&task.task_id).unwrap();
    assert_eq!(seen_by_b.title, "X");
    assert_eq!(seen_by_b.status, TaskStatus::Todo);
    assert_eq!(seen_by_b.version, 1);
    assert_eq!(client_b.sync_state(&task.task_id), Some(SyncState::Synced));

    let stored = repository.find_by_id(&task.task_id).await.unwrap().unwrap();
    assert_eq!(stored.version, 1);
    assert_eq!(stored.status, TaskStatus::Todo);
}

#[rstest]
#[tokio::test]
async fn test_lost_edit_can_be_reapplied_on_fresh_data() {
    let repository = Arc::new(InMemoryTaskRepository::new());
    let task = shared_task(&repository).await;
    let client_a = controller_over(&repository);
    let client_b = controller_over(&repository);
    client_a.refresh(&task.task_id).await.unwrap();
    client_b.refresh(&task.task_id).await.unwrap();
    client_a
        .apply_local_edit(&task.task_id, TaskPatch::new().title("X"))
        .unwrap();
    client_a.commit(&task.task_id).await.unwrap();
    client_b
        .apply_local_edit(&task.task_id, TaskPatch::new().status(TaskStatus::Done))
        .unwrap();

    let Err(ControllerError::EditLost { discarded, .. }) = client_b.commit(&task.task_id).await else {
        panic!("expected the stale commit to lose its edit");
    };
    client_b.apply_local_edit(&task.task_id, discarded).unwrap();
    let committed = client_b.commit(&task.task_id).await.unwrap();

    assert_eq!(committed.version, 2);
    assert_eq!(committed.title, "X");
    assert_eq!(committed.status, TaskStatus::Done);
}

#[rstest]
#[tokio::test]
async fn test_commit_on_task_deleted_mid_edit_evicts_it() {
    let repository = Arc::new(InMemoryTaskRepository::new());
    let task = shared_task(&repository).await;
    let client = controller_over(&repository);
    client.refresh(&task.task_id).await.unwrap();
    client
        .apply_local_edit(&task.task_id, TaskPatch::new().title("Edited"))
        .unwrap();

    repository.delete(&task.task_id).await.unwrap();
    let result = client.commit(&task.task_id).await;

    assert_eq!(result, Err(ControllerError::NotFound(task.task_id.clone())));
    assert_eq!(client.sync_state(&task.task_id), None);
}

#[rstest]
#[tokio::test]
async fn test_sequential_commits_by_one_client_never_conflict() {
    let repository = Arc::new(InMemoryTaskRepository::new());
    let task = shared_task(&repository).await;
    let client = controller_over(&repository);
    client.refresh(&task.task_id).await.unwrap();

    client
        .apply_local_edit(&task.task_id, TaskPatch::new().title("First"))
        .unwrap();
    let first = client.commit(&task.task_id).await.unwrap();
    client
        .apply_local_edit(&task.task_id, TaskPatch::new().status(TaskStatus::InProgress))
        .unwrap();
    let second = client.commit(&task.task_id).await.unwrap();

    assert_eq!(first.version, 1);
    assert_eq!(second.version, 2);
    assert_eq!(second.title, "First");
    assert_eq!(second.status, TaskStatus::InProgress);
    assert_eq!(client.last_known_version(&task.task_id), Some(2));
}

#[rstest]
#[tokio::test]
async fn test_created_task_is_cached_as_synced() {
    let repository = Arc::new(InMemoryTaskRepository::new());
    let client = controller_over(&repository);
    let project_id = ProjectId::generate();

    let created = client
        .create(&project_id, &CreateTaskRequest::new("Fresh"))
        .await
        .unwrap();

    assert_eq!(created.version, 0);
    assert_eq!(client.sync_state(&created.task_id), Some(SyncState::Synced));
    let stored = repository.find_by_id(&created.task_id).await.unwrap().unwrap();
    assert_eq!(stored, created);
}

// =============================================================================
// Over HTTP
// =============================================================================

async fn serve(application: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, application).await.unwrap();
    });
    format!("http://{address}")
}

async fn spawn_server(repositories: &Repositories) -> String {
    serve(router(AppState::new(repositories.clone(), &AuthConfig::new(TEST_SECRET)))).await
}

async fn http_client(base_url: &str, email: &str) -> (Arc<Session>, OptimisticUpdateController) {
    let password = if email == ADMIN_EMAIL { ADMIN_PASSWORD } else { "password123" };
    let config = ClientConfig::new(base_url).with_commit_timeout(COMMIT_TIMEOUT);
    let session = Arc::new(Session::new(config.clone()));
    session.login(email, password).await.unwrap();
    let gateway: Arc<dyn TaskGateway> = Arc::new(HttpTaskGateway::new(Arc::clone(&session)));
    (session, OptimisticUpdateController::from_config(gateway, &config))
}

#[rstest]
#[tokio::test]
async fn test_conflict_round_trip_over_http() {
    let repositories = seeded_repositories().await;
    let base_url = spawn_server(&repositories).await;
    let project = demo_project(&repositories).await;
    let task = demo_task(&repositories, "Design homepage").await;
    let (_, alice) = http_client(&base_url, "alice@demo.test").await;
    let (_, admin) = http_client(&base_url, ADMIN_EMAIL).await;
    alice.load(&project.project_id, None, None).await.unwrap();
    admin.load(&project.project_id, None, None).await.unwrap();

    alice
        .apply_local_edit(&task.task_id, TaskPatch::new().title("X"))
        .unwrap();
    let committed = alice.commit(&task.task_id).await.unwrap();
    admin
        .apply_local_edit(&task.task_id, TaskPatch::new().status(TaskStatus::Done))
        .unwrap();
    let lost = admin.commit(&task.task_id).await;

    assert_eq!(committed.version, 1);
    assert_eq!(
        lost,
        Err(ControllerError::EditLost {
            discarded: TaskPatch::new().status(TaskStatus::Done),
            current_version: 1,
        })
    );
    let seen_by_admin = admin.visible_task(&task.task_id).unwrap();
    assert_eq!(seen_by_admin.title, "X");
    assert_eq!(seen_by_admin.version, 1);
}

#[rstest]
#[tokio::test]
async fn test_clearing_assignee_over_http() {
    let repositories = seeded_repositories().await;
    let base_url = spawn_server(&repositories).await;
    let task = demo_task(&repositories, "Write documentation").await;
    let (_, admin) = http_client(&base_url, ADMIN_EMAIL).await;
    admin.refresh(&task.task_id).await.unwrap();

    admin
        .apply_local_edit(&task.task_id, TaskPatch::new().clear_assignee())
        .unwrap();
    let committed = admin.commit(&task.task_id).await.unwrap();

    assert_eq!(committed.assignee_user_id, None);
    assert_eq!(committed.version, 1);
    let stored = repositories.task_repository.find_by_id(&task.task_id).await.unwrap().unwrap();
    assert_eq!(stored, committed);
}

#[rstest]
#[tokio::test]
async fn test_member_commit_on_others_task_is_forbidden_over_http() {
    let repositories = seeded_repositories().await;
    let base_url = spawn_server(&repositories).await;
    let task = demo_task(&repositories, "Design homepage").await;
    let (_, bob) = http_client(&base_url, "bob@demo.test").await;
    bob.refresh(&task.task_id).await.unwrap();

    bob.apply_local_edit(&task.task_id, TaskPatch::new().status(TaskStatus::Done))
        .unwrap();
    let result = bob.commit(&task.task_id).await;

    assert_eq!(
        result,
        Err(ControllerError::Forbidden {
            rejected: TaskPatch::new().status(TaskStatus::Done),
        })
    );
    assert_eq!(bob.visible_task(&task.task_id), Some(task.clone()));
    let stored = repositories.task_repository.find_by_id(&task.task_id).await.unwrap().unwrap();
    assert_eq!(stored, task);
}

#[rstest]
#[tokio::test]
async fn test_token_rejected_after_login_clears_session() {
    let repositories = seeded_repositories().await;
    // Tokens are issued under one secret and verified under a rotated one.
    let issuing = AppState::new(repositories.clone(), &AuthConfig::new(TEST_SECRET));
    let verifying = AppState::new(repositories.clone(), &AuthConfig::new("rotated-secret"));
    let application = Router::new()
        .route("/auth/login", post(login))
        .with_state(issuing)
        .fallback_service(router(verifying));
    let base_url = serve(application).await;
    let task = demo_task(&repositories, "Design homepage").await;
    let (session, alice) = http_client(&base_url, "alice@demo.test").await;
    assert!(session.is_authenticated());

    let first = alice.refresh(&task.task_id).await;
    let authenticated_after_rejection = session.is_authenticated();
    let second = alice.refresh(&task.task_id).await;

    assert_eq!(first, Err(ControllerError::Unauthorized));
    assert!(!authenticated_after_rejection);
    assert_eq!(second, Err(ControllerError::Unauthorized));
    assert_eq!(alice.sync_state(&task.task_id), None);
}

#[rstest]
#[tokio::test]
async fn test_logged_out_session_is_unauthorized() {
    let repositories = seeded_repositories().await;
    let base_url = spawn_server(&repositories).await;
    let task = demo_task(&repositories, "Design homepage").await;
    let (session, alice) = http_client(&base_url, "alice@demo.test").await;

    session.logout();
    let result = alice.refresh(&task.task_id).await;

    assert!(!session.is_authenticated());
    assert_eq!(result, Err(ControllerError::Unauthorized));
}

#[rstest]
#[tokio::test]
async fn test_login_with_wrong_password_is_unauthorized() {
    let repositories = seeded_repositories().await;
    let base_url = spawn_server(&repositories).await;
    let session = Session::new(ClientConfig::new(&base_url));

    let result = session.login("alice@demo.test", "nope").await;

    assert_eq!(result, Err(GatewayError::Unauthorized));
    assert!(!session.is_authenticated());
}

#[rstest]
#[tokio::test]
async fn test_http_gateway_project_and_delete_calls() {
    let repositories = seeded_repositories().await;
    let base_url = spawn_server(&repositories).await;
    let task = demo_task(&repositories, "Implement backend").await;
    let config = ClientConfig::new(&base_url);
    let session = Arc::new(Session::new(config));
    session.login("bob@demo.test", "password123").await.unwrap();
    let gateway = HttpTaskGateway::new(session);

    let projects = gateway.list_projects(Some("website")).await.unwrap();
    gateway.delete_task(&task.task_id).await.unwrap();
    let deleted_again = gateway.delete_task(&task.task_id).await;

    assert_eq!(projects.len(), 1);
    assert_eq!(deleted_again, Err(GatewayError::NotFound));
}
