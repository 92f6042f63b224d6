///////////////////////////////////////////////////////////////////////////////
// Components /////////////////////////////////////////////////////////////////

/// An empty message.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Empty {}
/// A notification describing a mutation of a catalog resource.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EventNotification {
    /// The kind of mutation which took place.
    #[prost(enumeration = "EventKind", tag = "1")]
    pub kind: i32,
    /// The kind of the mutated resource.
    #[prost(enumeration = "ResourceKind", tag = "2")]
    pub resource_kind: i32,
    /// The ID of the mutated resource, as a UUID string.
    #[prost(string, tag = "3")]
    pub resource_id: ::prost::alloc::string::String,
    /// The unix seconds timestamp at which the mutation was recorded.
    #[prost(int64, tag = "4")]
    pub timestamp: i64,
    /// An optional opaque payload accompanying the notification.
    #[prost(bytes = "vec", tag = "5")]
    pub payload: ::prost::alloc::vec::Vec<u8>,
    /// The broker-assigned sequence number of this notification.
    ///
    /// Populated on delivery; unused on publication.
    #[prost(uint64, tag = "6")]
    pub sequence: u64,
}
//////////////////////////////////////////////////////////////////////////////
// Stream Groups /////////////////////////////////////////////////////////////

/// A request to create a new stream group.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateStreamGroupRequest {
    /// The ID of the project owning the targeted resource.
    #[prost(string, tag = "1")]
    pub project_id: ::prost::alloc::string::String,
    /// The kind of the resource to subscribe to.
    #[prost(enumeration = "ResourceKind", tag = "2")]
    pub resource_kind: i32,
    /// The ID of the resource to subscribe to, as a UUID string.
    #[prost(string, tag = "3")]
    pub resource_id: ::prost::alloc::string::String,
    /// A bool indicating if events of sub-resources should be included.
    #[prost(bool, tag = "4")]
    pub include_sub_resources: bool,
    /// The delivery policy encoded into the group's durable broker consumer at creation time.
    #[prost(oneof = "create_stream_group_request::DeliveryPolicy", tags = "10, 11, 12")]
    pub delivery_policy: ::core::option::Option<create_stream_group_request::DeliveryPolicy>,
}
/// Nested message and enum types in `CreateStreamGroupRequest`.
pub mod create_stream_group_request {
    /// The delivery policy encoded into the group's durable broker consumer at creation time.
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum DeliveryPolicy {
        /// Replay from the first retained message.
        #[prost(message, tag = "10")]
        All(super::Empty),
        /// Replay from messages with unix seconds timestamp >= the given value.
        #[prost(int64, tag = "11")]
        FromTimestamp(i64),
        /// Replay from the given broker sequence.
        #[prost(uint64, tag = "12")]
        FromSequence(u64),
    }
}
/// A response from creating a stream group.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateStreamGroupResponse {
    /// The ID of the new stream group.
    #[prost(string, tag = "1")]
    pub stream_group_id: ::prost::alloc::string::String,
}
/// A request to fetch a stream group.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetStreamGroupRequest {
    #[prost(string, tag = "1")]
    pub stream_group_id: ::prost::alloc::string::String,
}
/// A response carrying a stream group.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetStreamGroupResponse {
    #[prost(message, optional, tag = "1")]
    pub group: ::core::option::Option<StreamGroup>,
}
/// A durable, named subscription shared by any number of live consumer sessions.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StreamGroup {
    /// The ID of this stream group, as a UUID string.
    #[prost(string, tag = "1")]
    pub id: ::prost::alloc::string::String,
    /// The subject filter of this stream group.
    #[prost(string, tag = "2")]
    pub subject: ::prost::alloc::string::String,
    /// A bool indicating if events of sub-resources are included.
    #[prost(bool, tag = "3")]
    pub include_sub_resources: bool,
    /// The ID of the owning project.
    #[prost(string, tag = "4")]
    pub project_id: ::prost::alloc::string::String,
    /// The unix seconds timestamp at which this group was created.
    #[prost(int64, tag = "5")]
    pub created_at: i64,
}
/// A request to delete a stream group.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeleteStreamGroupRequest {
    #[prost(string, tag = "1")]
    pub stream_group_id: ::prost::alloc::string::String,
}
//////////////////////////////////////////////////////////////////////////////
// Object Group Revisions ////////////////////////////////////////////////////

/// A request to append a new revision to an object group.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AppendObjectGroupRevisionRequest {
    /// The ID of the target object group, as a UUID string.
    #[prost(string, tag = "1")]
    pub object_group_id: ::prost::alloc::string::String,
    /// The opaque payload of the new revision.
    #[prost(bytes = "vec", tag = "2")]
    pub payload: ::prost::alloc::vec::Vec<u8>,
}
/// A response from appending a new revision to an object group.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AppendObjectGroupRevisionResponse {
    /// The ID of the new revision, as a UUID string.
    #[prost(string, tag = "1")]
    pub revision_id: ::prost::alloc::string::String,
    /// The monotonic revision number assigned to the new revision.
    #[prost(uint64, tag = "2")]
    pub revision: u64,
}
//////////////////////////////////////////////////////////////////////////////
// Notification Stream ///////////////////////////////////////////////////////

/// A client frame of the bidirectional notification stream.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NotificationStreamRequest {
    #[prost(oneof = "notification_stream_request::Action", tags = "1, 2, 3")]
    pub action: ::core::option::Option<notification_stream_request::Action>,
}
/// Nested message and enum types in `NotificationStreamRequest`.
pub mod notification_stream_request {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Action {
        /// Bind this stream to a stream group; must be the first frame, exactly once.
        #[prost(message, tag = "1")]
        Init(super::NotificationStreamInit),
        /// Acknowledge the identified chunks as processed.
        #[prost(message, tag = "2")]
        Ack(super::NotificationStreamAck),
        /// Gracefully close the stream.
        #[prost(message, tag = "3")]
        Close(super::Empty),
    }
}
/// The initial frame of a notification stream.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NotificationStreamInit {
    /// The ID of the stream group to bind to, as a UUID string.
    #[prost(string, tag = "1")]
    pub stream_group_id: ::prost::alloc::string::String,
}
/// An acknowledgement of one or more delivered chunks.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NotificationStreamAck {
    /// The opaque chunk IDs being acknowledged.
    #[prost(string, repeated, tag = "1")]
    pub chunk_ids: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}
/// A server-sent chunk of notifications, acknowledged as an atomic unit.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NotificationStreamResponse {
    /// The opaque ID with which the client must acknowledge this chunk.
    #[prost(string, tag = "1")]
    pub ack_chunk_id: ::prost::alloc::string::String,
    /// The notifications of this chunk, in broker delivery order.
    #[prost(message, repeated, tag = "2")]
    pub notifications: ::prost::alloc::vec::Vec<EventNotification>,
}
/// The kind of mutation announced by a notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum EventKind {
    Unspecified = 0,
    Created = 1,
    Updated = 2,
    Deleted = 3,
}
/// The kind of a catalog resource participating in the notification hierarchy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ResourceKind {
    Unspecified = 0,
    Project = 1,
    Dataset = 2,
    ObjectGroup = 3,
}
#[doc = r" Generated server implementations."]
pub mod eventing_controller_server {
    #![allow(unused_variables, dead_code, missing_docs, clippy::let_unit_value)]
    use tonic::codegen::*;
    #[doc = "Generated trait containing gRPC methods that should be implemented for use with EventingControllerServer."]
    #[async_trait]
    pub trait EventingController: Send + Sync + 'static {
        #[doc = " Create a new stream group."]
        async fn create_stream_group(&self, request: tonic::Request<super::CreateStreamGroupRequest>) -> Result<tonic::Response<super::CreateStreamGroupResponse>, tonic::Status>;
        #[doc = " Fetch an existing stream group."]
        async fn get_stream_group(&self, request: tonic::Request<super::GetStreamGroupRequest>) -> Result<tonic::Response<super::GetStreamGroupResponse>, tonic::Status>;
        #[doc = " Delete a stream group along with its durable broker consumer."]
        async fn delete_stream_group(&self, request: tonic::Request<super::DeleteStreamGroupRequest>) -> Result<tonic::Response<super::Empty>, tonic::Status>;
        #[doc = " Append a new revision to an object group."]
        async fn append_object_group_revision(
            &self, request: tonic::Request<super::AppendObjectGroupRevisionRequest>,
        ) -> Result<tonic::Response<super::AppendObjectGroupRevisionResponse>, tonic::Status>;
        #[doc = "Server streaming response type for the NotificationStream method."]
        type NotificationStreamStream: futures_core::Stream<Item = Result<super::NotificationStreamResponse, tonic::Status>> + Send + 'static;
        #[doc = " Open a notification stream bound to a stream group."]
        async fn notification_stream(
            &self, request: tonic::Request<tonic::Streaming<super::NotificationStreamRequest>>,
        ) -> Result<tonic::Response<Self::NotificationStreamStream>, tonic::Status>;
    }
    #[doc = " The catalog eventing controller interface."]
    #[derive(Debug)]
    pub struct EventingControllerServer<T: EventingController> {
        inner: _Inner<T>,
        accept_compression_encodings: (),
        send_compression_encodings: (),
    }
    struct _Inner<T>(Arc<T>);
    impl<T: EventingController> EventingControllerServer<T> {
        pub fn new(inner: T) -> Self {
            let inner = Arc::new(inner);
            let inner = _Inner(inner);
            Self {
                inner,
                accept_compression_encodings: Default::default(),
                send_compression_encodings: Default::default(),
            }
        }
        pub fn with_interceptor<F>(inner: T, interceptor: F) -> InterceptedService<Self, F>
        where
            F: tonic::service::Interceptor,
        {
            InterceptedService::new(Self::new(inner), interceptor)
        }
    }
    impl<T, B> tonic::codegen::Service<http::Request<B>> for EventingControllerServer<T>
    where
        T: EventingController,
        B: Body + Send + 'static,
        B::Error: Into<StdError> + Send + 'static,
    {
        type Response = http::Response<tonic::body::BoxBody>;
        type Error = Never;
        type Future = BoxFuture<Self::Response, Self::Error>;
        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }
        fn call(&mut self, req: http::Request<B>) -> Self::Future {
            let inner = self.inner.clone();
            match req.uri().path() {
                "/eventing.EventingController/CreateStreamGroup" => {
                    #[allow(non_camel_case_types)]
                    struct CreateStreamGroupSvc<T: EventingController>(pub Arc<T>);
                    impl<T: EventingController> tonic::server::UnaryService<super::CreateStreamGroupRequest> for CreateStreamGroupSvc<T> {
                        type Response = super::CreateStreamGroupResponse;
                        type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                        fn call(&mut self, request: tonic::Request<super::CreateStreamGroupRequest>) -> Self::Future {
                            let inner = self.0.clone();
                            let fut = async move { (*inner).create_stream_group(request).await };
                            Box::pin(fut)
                        }
                    }
                    let accept_compression_encodings = self.accept_compression_encodings;
                    let send_compression_encodings = self.send_compression_encodings;
                    let inner = self.inner.clone();
                    let fut = async move {
                        let inner = inner.0;
                        let method = CreateStreamGroupSvc(inner);
                        let codec = tonic::codec::ProstCodec::default();
                        let mut grpc = tonic::server::Grpc::new(codec).apply_compression_config(accept_compression_encodings, send_compression_encodings);
                        let res = grpc.unary(method, req).await;
                        Ok(res)
                    };
                    Box::pin(fut)
                }
                "/eventing.EventingController/GetStreamGroup" => {
                    #[allow(non_camel_case_types)]
                    struct GetStreamGroupSvc<T: EventingController>(pub Arc<T>);
                    impl<T: EventingController> tonic::server::UnaryService<super::GetStreamGroupRequest> for GetStreamGroupSvc<T> {
                        type Response = super::GetStreamGroupResponse;
                        type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                        fn call(&mut self, request: tonic::Request<super::GetStreamGroupRequest>) -> Self::Future {
                            let inner = self.0.clone();
                            let fut = async move { (*inner).get_stream_group(request).await };
                            Box::pin(fut)
                        }
                    }
                    let accept_compression_encodings = self.accept_compression_encodings;
                    let send_compression_encodings = self.send_compression_encodings;
                    let inner = self.inner.clone();
                    let fut = async move {
                        let inner = inner.0;
                        let method = GetStreamGroupSvc(inner);
                        let codec = tonic::codec::ProstCodec::default();
                        let mut grpc = tonic::server::Grpc::new(codec).apply_compression_config(accept_compression_encodings, send_compression_encodings);
                        let res = grpc.unary(method, req).await;
                        Ok(res)
                    };
                    Box::pin(fut)
                }
                "/eventing.EventingController/DeleteStreamGroup" => {
                    #[allow(non_camel_case_types)]
                    struct DeleteStreamGroupSvc<T: EventingController>(pub Arc<T>);
                    impl<T: EventingController> tonic::server::UnaryService<super::DeleteStreamGroupRequest> for DeleteStreamGroupSvc<T> {
                        type Response = super::Empty;
                        type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                        fn call(&mut self, request: tonic::Request<super::DeleteStreamGroupRequest>) -> Self::Future {
                            let inner = self.0.clone();
                            let fut = async move { (*inner).delete_stream_group(request).await };
                            Box::pin(fut)
                        }
                    }
                    let accept_compression_encodings = self.accept_compression_encodings;
                    let send_compression_encodings = self.send_compression_encodings;
                    let inner = self.inner.clone();
                    let fut = async move {
                        let inner = inner.0;
                        let method = DeleteStreamGroupSvc(inner);
                        let codec = tonic::codec::ProstCodec::default();
                        let mut grpc = tonic::server::Grpc::new(codec).apply_compression_config(accept_compression_encodings, send_compression_encodings);
                        let res = grpc.unary(method, req).await;
                        Ok(res)
                    };
                    Box::pin(fut)
                }
                "/eventing.EventingController/AppendObjectGroupRevision" => {
                    #[allow(non_camel_case_types)]
                    struct AppendObjectGroupRevisionSvc<T: EventingController>(pub Arc<T>);
                    impl<T: EventingController> tonic::server::UnaryService<super::AppendObjectGroupRevisionRequest> for AppendObjectGroupRevisionSvc<T> {
                        type Response = super::AppendObjectGroupRevisionResponse;
                        type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                        fn call(&mut self, request: tonic::Request<super::AppendObjectGroupRevisionRequest>) -> Self::Future {
                            let inner = self.0.clone();
                            let fut = async move { (*inner).append_object_group_revision(request).await };
                            Box::pin(fut)
                        }
                    }
                    let accept_compression_encodings = self.accept_compression_encodings;
                    let send_compression_encodings = self.send_compression_encodings;
                    let inner = self.inner.clone();
                    let fut = async move {
                        let inner = inner.0;
                        let method = AppendObjectGroupRevisionSvc(inner);
                        let codec = tonic::codec::ProstCodec::default();
                        let mut grpc = tonic::server::Grpc::new(codec).apply_compression_config(accept_compression_encodings, send_compression_encodings);
                        let res = grpc.unary(method, req).await;
                        Ok(res)
                    };
                    Box::pin(fut)
                }
                "/eventing.EventingController/NotificationStream" => {
                    #[allow(non_camel_case_types)]
                    struct NotificationStreamSvc<T: EventingController>(pub Arc<T>);
                    impl<T: EventingController> tonic::server::StreamingService<super::NotificationStreamRequest> for NotificationStreamSvc<T> {
                        type Response = super::NotificationStreamResponse;
                        type ResponseStream = T::NotificationStreamStream;
                        type Future = BoxFuture<tonic::Response<Self::ResponseStream>, tonic::Status>;
                        fn call(&mut self, request: tonic::Request<tonic::Streaming<super::NotificationStreamRequest>>) -> Self::Future {
                            let inner = self.0.clone();
                            let fut = async move { (*inner).notification_stream(request).await };
                            Box::pin(fut)
                        }
                    }
                    let accept_compression_encodings = self.accept_compression_encodings;
                    let send_compression_encodings = self.send_compression_encodings;
                    let inner = self.inner.clone();
                    let fut = async move {
                        let inner = inner.0;
                        let method = NotificationStreamSvc(inner);
                        let codec = tonic::codec::ProstCodec::default();
                        let mut grpc = tonic::server::Grpc::new(codec).apply_compression_config(accept_compression_encodings, send_compression_encodings);
                        let res = grpc.streaming(method, req).await;
                        Ok(res)
                    };
                    Box::pin(fut)
                }
                _ => Box::pin(async move {
                    Ok(http::Response::builder()
                        .status(200)
                        .header("grpc-status", "12")
                        .header("content-type", "application/grpc")
                        .body(empty_body())
                        .unwrap())
                }),
            }
        }
    }
    impl<T: EventingController> Clone for EventingControllerServer<T> {
        fn clone(&self) -> Self {
            let inner = self.inner.clone();
            Self {
                inner,
                accept_compression_encodings: self.accept_compression_encodings,
                send_compression_encodings: self.send_compression_encodings,
            }
        }
    }
    impl<T: EventingController> Clone for _Inner<T> {
        fn clone(&self) -> Self {
            Self(self.0.clone())
        }
    }
    impl<T: std::fmt::Debug> std::fmt::Debug for _Inner<T> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self.0)
        }
    }
    impl<T: EventingController> tonic::transport::NamedService for EventingControllerServer<T> {
        const NAME: &'static str = "eventing.EventingController";
    }
}
