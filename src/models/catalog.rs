//! Catalog storage records.
//!
//! Projects contain datasets, datasets contain object groups, object groups carry
//! versioned revisions. All records are keyed by their UUID under a one-byte kind
//! prefix in the catalog tree, see `crate::catalog`.

/// A project record.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProjectRecord {
    /// The ID of this project, as a UUID string.
    #[prost(string, tag = "1")]
    pub id: ::prost::alloc::string::String,
    /// The display name of this project.
    #[prost(string, tag = "2")]
    pub name: ::prost::alloc::string::String,
}
/// A dataset record.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DatasetRecord {
    /// The ID of this dataset, as a UUID string.
    #[prost(string, tag = "1")]
    pub id: ::prost::alloc::string::String,
    /// The ID of the project owning this dataset.
    #[prost(string, tag = "2")]
    pub project_id: ::prost::alloc::string::String,
    /// The display name of this dataset.
    #[prost(string, tag = "3")]
    pub name: ::prost::alloc::string::String,
}
/// An object group record.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ObjectGroupRecord {
    /// The ID of this object group, as a UUID string.
    #[prost(string, tag = "1")]
    pub id: ::prost::alloc::string::String,
    /// The ID of the dataset owning this object group.
    #[prost(string, tag = "2")]
    pub dataset_id: ::prost::alloc::string::String,
    /// The ID of the project transitively owning this object group.
    #[prost(string, tag = "3")]
    pub project_id: ::prost::alloc::string::String,
    /// The monotonic revision counter of this object group.
    ///
    /// The next revision to be appended will carry the value `revision_counter + 1`.
    #[prost(uint64, tag = "4")]
    pub revision_counter: u64,
    /// The ID of the head (latest) revision, or empty if no revision exists yet.
    #[prost(string, tag = "5")]
    pub head_id: ::prost::alloc::string::String,
}
/// An immutable revision of an object group's contents.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RevisionRecord {
    /// The ID of this revision, as a UUID string.
    #[prost(string, tag = "1")]
    pub id: ::prost::alloc::string::String,
    /// The ID of the object group owning this revision.
    #[prost(string, tag = "2")]
    pub object_group_id: ::prost::alloc::string::String,
    /// The monotonic revision number of this revision, starting at 1.
    #[prost(uint64, tag = "3")]
    pub revision: u64,
    /// The opaque payload of this revision.
    #[prost(bytes = "vec", tag = "4")]
    pub payload: ::prost::alloc::vec::Vec<u8>,
    /// The unix seconds timestamp at which this revision was created.
    #[prost(int64, tag = "5")]
    pub created_at: i64,
}
