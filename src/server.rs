mod http;

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tonic::transport::Server;
use tonic::{Request, Response, Status, Streaming};

use crate::broker::BrokerCtlMsg;
use crate::catalog::CatalogStore;
use crate::config::Config;
use crate::database::Database;
use crate::error::{AppError, RpcResult};
use crate::groups::StreamGroupRegistry;
use crate::grpc;
use crate::publisher::EventPublisher;
use crate::session::ConsumerSession;
use crate::subject;

pub use http::spawn_http_server;

/// Application server.
pub struct AppServer {
    /// The application's runtime config.
    config: Arc<Config>,
    /// The catalog resource store.
    catalog: CatalogStore,
    /// The stream group registry.
    registry: StreamGroupRegistry,
    /// The event publisher used to announce catalog mutations.
    publisher: EventPublisher,
    /// A channel for communicating with the broker controller.
    broker_tx: mpsc::Sender<BrokerCtlMsg>,

    /// A channel used for triggering graceful shutdown.
    shutdown: broadcast::Sender<()>,
}

impl AppServer {
    /// Create a new instance.
    pub fn new(
        config: Arc<Config>, catalog: CatalogStore, registry: StreamGroupRegistry, publisher: EventPublisher, broker_tx: mpsc::Sender<BrokerCtlMsg>,
        shutdown: broadcast::Sender<()>,
    ) -> Self {
        Self {
            config,
            catalog,
            registry,
            publisher,
            broker_tx,
            shutdown,
        }
    }

    /// Spawn this controller which also creates the client gRPC server.
    pub fn spawn(self) -> Result<JoinHandle<()>> {
        let addr = format!("0.0.0.0:{}", self.config.client_port).parse().context("failed to parse listener address")?;
        let (shutdown, mut shutdown_rx) = (self.shutdown.clone(), self.shutdown.subscribe());
        let service = grpc::EventingControllerServer::new(self);
        let fut = Server::builder().add_service(service).serve_with_shutdown(addr, async move {
            let _res = shutdown_rx.recv().await;
        });
        Ok(tokio::spawn(async move {
            if let Err(err) = fut.await {
                tracing::error!(error = ?err, "error from client gRPC server");
            }
            let _res = shutdown.send(());
        }))
    }

    /// Check the given request's API token against the configured token, else fail.
    ///
    /// When no API token is configured, all callers are admitted.
    fn must_authenticate<T>(&self, req: &Request<T>) -> Result<()> {
        let expected = match &self.config.api_token {
            Some(token) => token.as_str(),
            None => return Ok(()),
        };
        let header_val = req.metadata().get("authorization").ok_or(AppError::Unauthorized)?;
        let header_val = header_val.to_str().map_err(|_err| AppError::Unauthorized)?;
        let presented = header_val.strip_prefix("Bearer ").unwrap_or(header_val);
        if presented != expected {
            return Err(AppError::Unauthorized.into());
        }
        Ok(())
    }
}

#[tonic::async_trait]
impl grpc::EventingController for AppServer {
    /// Server streaming response type for the NotificationStream method.
    type NotificationStreamStream = ReceiverStream<RpcResult<grpc::NotificationStreamResponse>>;

    /// Create a new stream group along with its durable broker consumer.
    async fn create_stream_group(&self, request: Request<grpc::CreateStreamGroupRequest>) -> RpcResult<Response<grpc::CreateStreamGroupResponse>> {
        self.must_authenticate(&request).map_err(AppError::grpc)?;
        let record = self.registry.create_stream_group(request.into_inner()).await.map_err(AppError::grpc)?;
        Ok(Response::new(grpc::CreateStreamGroupResponse { stream_group_id: record.id }))
    }

    /// Fetch a stream group by ID.
    async fn get_stream_group(&self, request: Request<grpc::GetStreamGroupRequest>) -> RpcResult<Response<grpc::GetStreamGroupResponse>> {
        self.must_authenticate(&request).map_err(AppError::grpc)?;
        let id = subject::parse_resource_id(&request.into_inner().stream_group_id).map_err(AppError::grpc)?;
        let record = self.registry.get_stream_group(&id).map_err(AppError::grpc)?;
        Ok(Response::new(grpc::GetStreamGroupResponse {
            group: Some(grpc::StreamGroup {
                id: record.id,
                subject: record.subject,
                include_sub_resources: record.use_sub_resource,
                project_id: record.project_id,
                created_at: record.created_at,
            }),
        }))
    }

    /// Delete a stream group along with its durable broker consumer.
    async fn delete_stream_group(&self, request: Request<grpc::DeleteStreamGroupRequest>) -> RpcResult<Response<grpc::Empty>> {
        self.must_authenticate(&request).map_err(AppError::grpc)?;
        let id = subject::parse_resource_id(&request.into_inner().stream_group_id).map_err(AppError::grpc)?;
        self.registry.delete_stream_group(&id).await.map_err(AppError::grpc)?;
        Ok(Response::new(grpc::Empty {}))
    }

    /// Append a new revision to an object group & publish a corresponding notification.
    async fn append_object_group_revision(
        &self, request: Request<grpc::AppendObjectGroupRevisionRequest>,
    ) -> RpcResult<Response<grpc::AppendObjectGroupRevisionResponse>> {
        self.must_authenticate(&request).map_err(AppError::grpc)?;
        let req = request.into_inner();
        let group_id = subject::parse_resource_id(&req.object_group_id).map_err(AppError::grpc)?;

        let catalog = self.catalog.clone();
        let (revision_id, revision) = Database::spawn_blocking(move || catalog.append_revision(&group_id, req.payload))
            .await
            .map_err(|err| AppError::grpc(err.into()))?
            .map_err(AppError::grpc)?;

        // The write stands even if its notification can not be published.
        let publish_res = self
            .publisher
            .publish(
                grpc::EventKind::Updated,
                grpc::ResourceKind::ObjectGroup,
                &req.object_group_id,
                revision_id.to_string().into_bytes(),
            )
            .await;
        if let Err(err) = publish_res {
            tracing::error!(error = ?err, "error publishing notification for new object group revision");
        }
        Ok(Response::new(grpc::AppendObjectGroupRevisionResponse {
            revision_id: revision_id.to_string(),
            revision,
        }))
    }

    /// Open a notification stream bound to a stream group.
    async fn notification_stream(&self, request: Request<Streaming<grpc::NotificationStreamRequest>>) -> RpcResult<Response<Self::NotificationStreamStream>> {
        self.must_authenticate(&request).map_err(AppError::grpc)?;

        // Await initial setup payload, which must bind this stream to a stream group.
        let mut request_stream = request.into_inner();
        let req_action = request_stream
            .message()
            .await?
            .ok_or_else(|| Status::invalid_argument("no stream init request received"))?
            .action
            .ok_or_else(|| Status::invalid_argument("no action variant received in request"))?;
        let init = match req_action {
            grpc::NotificationStreamRequestAction::Init(init) => init,
            _ => return Err(Status::invalid_argument("invalid action variant received in request, expected `init` variant")),
        };
        let group_id = subject::parse_resource_id(&init.stream_group_id).map_err(AppError::grpc)?;
        let _record = self.registry.get_stream_group(&group_id).map_err(AppError::grpc)?;

        // Find the group's consumer controller & attach a new session to it.
        let (tx, rx) = oneshot::channel();
        self.broker_tx
            .send(BrokerCtlMsg::GetConsumer { id: group_id, tx })
            .await
            .map_err(|_err| AppError::grpc(anyhow!("error communicating with broker controller")))?;
        let consumer = rx
            .await
            .map_err(|_err| AppError::grpc(anyhow!("error awaiting response from broker controller")))?
            .ok_or_else(|| Status::failed_precondition("target stream group has no live consumer controller"))?;

        let (res_tx, res_rx) = mpsc::channel(10);
        ConsumerSession::new(self.config.clone(), consumer, res_tx, request_stream, self.shutdown.clone()).spawn();
        Ok(Response::new(ReceiverStream::new(res_rx)))
    }
}
