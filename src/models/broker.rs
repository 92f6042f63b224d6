//! Broker storage records.

use crate::grpc::EventNotification;

/// An event as stored in the broker's event log.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StoredEvent {
    /// The subject on which this event was published.
    #[prost(string, tag = "1")]
    pub subject: ::prost::alloc::string::String,
    /// The published notification.
    #[prost(message, optional, tag = "2")]
    pub notification: ::core::option::Option<EventNotification>,
}
/// A durable broker consumer record.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ConsumerRecord {
    /// The ID of this consumer, as a UUID string.
    ///
    /// Consumers created for stream groups are named by the group's ID.
    #[prost(string, tag = "1")]
    pub id: ::prost::alloc::string::String,
    /// The subject filter applied to the event log for this consumer.
    #[prost(string, tag = "2")]
    pub subject_filter: ::prost::alloc::string::String,
    /// The unix seconds timestamp at which this consumer was created.
    #[prost(int64, tag = "3")]
    pub created_at: i64,
}
/// A stream group registry row.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StreamGroupRecord {
    /// The ID of this stream group, as a UUID string.
    #[prost(string, tag = "1")]
    pub id: ::prost::alloc::string::String,
    /// The subject filter derived from the group's target resource.
    #[prost(string, tag = "2")]
    pub subject: ::prost::alloc::string::String,
    /// A bool indicating if events of sub-resources are included.
    #[prost(bool, tag = "3")]
    pub use_sub_resource: bool,
    /// The ID of the owning project.
    #[prost(string, tag = "4")]
    pub project_id: ::prost::alloc::string::String,
    /// The unix seconds timestamp at which this group was created.
    #[prost(int64, tag = "5")]
    pub created_at: i64,
}
