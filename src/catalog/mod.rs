//! Catalog store.
//!
//! Hierarchy reads for subject resolution along with the transactional object-group
//! revision counter. Catalog records are prost models keyed by a one-byte kind prefix
//! plus the resource UUID; revision rows additionally carry the big-endian revision
//! number so that revisions of a group sort contiguously.


use anyhow::{anyhow, Context, Result};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::Tree;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::catalog::{DatasetRecord, ObjectGroupRecord, ProjectRecord, RevisionRecord};
use crate::utils;

/// The key prefix used for storing project records.
pub const PREFIX_PROJECT: &[u8; 1] = b"p";
/// The key prefix used for storing dataset records.
pub const PREFIX_DATASET: &[u8; 1] = b"d";
/// The key prefix used for storing object group records.
pub const PREFIX_OBJECT_GROUP: &[u8; 1] = b"g";
/// The key prefix used for storing object group revision rows.
pub const PREFIX_REVISION: &[u8; 1] = b"r";

/// The resolved parent chain of a catalog resource.
///
/// Order matches the subject hierarchy: project, then dataset, then object group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentChain {
    pub project_id: Uuid,
    pub dataset_id: Option<Uuid>,
    pub object_group_id: Option<Uuid>,
}

/// A handle to the catalog storage tree.
#[derive(Clone)]
pub struct CatalogStore {
    tree: Tree,
}

impl CatalogStore {
    /// Create a new instance.
    pub fn new(tree: Tree) -> Self {
        Self { tree }
    }

    /// Create a new project record.
    pub fn create_project(&self, id: Uuid, name: &str) -> Result<()> {
        let record = ProjectRecord { id: id.to_string(), name: name.into() };
        self.tree
            .insert(&utils::encode_uuid_prefix(PREFIX_PROJECT, &id), utils::encode_model(&record)?)
            .context("error writing project record")?;
        Ok(())
    }

    /// Create a new dataset record under the given project.
    pub fn create_dataset(&self, id: Uuid, project_id: Uuid, name: &str) -> Result<()> {
        if self.get_project(&project_id)?.is_none() {
            anyhow::bail!(AppError::ResourceNotFound);
        }
        let record = DatasetRecord {
            id: id.to_string(),
            project_id: project_id.to_string(),
            name: name.into(),
        };
        self.tree
            .insert(&utils::encode_uuid_prefix(PREFIX_DATASET, &id), utils::encode_model(&record)?)
            .context("error writing dataset record")?;
        Ok(())
    }

    /// Create a new object group record under the given dataset.
    pub fn create_object_group(&self, id: Uuid, dataset_id: Uuid) -> Result<()> {
        let dataset = self.get_dataset(&dataset_id)?.ok_or(AppError::ResourceNotFound)?;
        let record = ObjectGroupRecord {
            id: id.to_string(),
            dataset_id: dataset_id.to_string(),
            project_id: dataset.project_id,
            revision_counter: 0,
            head_id: String::new(),
        };
        self.tree
            .insert(&utils::encode_uuid_prefix(PREFIX_OBJECT_GROUP, &id), utils::encode_model(&record)?)
            .context("error writing object group record")?;
        Ok(())
    }

    /// Fetch the project record of the given ID.
    pub fn get_project(&self, id: &Uuid) -> Result<Option<ProjectRecord>> {
        self.tree
            .get(&utils::encode_uuid_prefix(PREFIX_PROJECT, id))
            .context("error fetching project record")?
            .map(|val| utils::decode_model(&val))
            .transpose()
    }

    /// Fetch the dataset record of the given ID.
    pub fn get_dataset(&self, id: &Uuid) -> Result<Option<DatasetRecord>> {
        self.tree
            .get(&utils::encode_uuid_prefix(PREFIX_DATASET, id))
            .context("error fetching dataset record")?
            .map(|val| utils::decode_model(&val))
            .transpose()
    }

    /// Fetch the object group record of the given ID.
    pub fn get_object_group(&self, id: &Uuid) -> Result<Option<ObjectGroupRecord>> {
        self.tree
            .get(&utils::encode_uuid_prefix(PREFIX_OBJECT_GROUP, id))
            .context("error fetching object group record")?
            .map(|val| utils::decode_model(&val))
            .transpose()
    }

    /// Fetch the revision row of the given object group & revision number.
    pub fn get_revision(&self, object_group_id: &Uuid, revision: u64) -> Result<Option<RevisionRecord>> {
        self.tree
            .get(&utils::encode_uuid_u64_prefix(PREFIX_REVISION, object_group_id, revision))
            .context("error fetching revision row")?
            .map(|val| utils::decode_model(&val))
            .transpose()
    }

    /// Resolve the parent chain of the given project.
    pub fn project_chain(&self, id: &Uuid) -> Result<ParentChain> {
        let _project = self.get_project(id)?.ok_or(AppError::ResourceNotFound)?;
        Ok(ParentChain { project_id: *id, dataset_id: None, object_group_id: None })
    }

    /// Resolve the parent chain of the given dataset.
    pub fn dataset_chain(&self, id: &Uuid) -> Result<ParentChain> {
        let dataset = self.get_dataset(id)?.ok_or(AppError::ResourceNotFound)?;
        let project_id = Uuid::parse_str(&dataset.project_id).context("malformed project ID on dataset record")?;
        Ok(ParentChain { project_id, dataset_id: Some(*id), object_group_id: None })
    }

    /// Resolve the parent chain of the given object group.
    pub fn object_group_chain(&self, id: &Uuid) -> Result<ParentChain> {
        let group = self.get_object_group(id)?.ok_or(AppError::ResourceNotFound)?;
        let project_id = Uuid::parse_str(&group.project_id).context("malformed project ID on object group record")?;
        let dataset_id = Uuid::parse_str(&group.dataset_id).context("malformed dataset ID on object group record")?;
        Ok(ParentChain {
            project_id,
            dataset_id: Some(dataset_id),
            object_group_id: Some(*id),
        })
    }

    /// Append a new revision to the given object group.
    ///
    /// The counter bump and the revision row are committed in one serializable transaction,
    /// so concurrent appenders obtain strictly increasing, gap-free revision numbers starting
    /// at 1, and a rolled back transaction consumes no counter value.
    pub fn append_revision(&self, object_group_id: &Uuid, payload: Vec<u8>) -> Result<(Uuid, u64)> {
        let revision_id = Uuid::new_v4();
        let created_at = time::OffsetDateTime::now_utc().unix_timestamp();
        let group_key = utils::encode_uuid_prefix(PREFIX_OBJECT_GROUP, object_group_id);

        let res = self.tree.transaction(|tx| {
            let group_bytes = tx.get(&group_key[..])?.ok_or(ConflictableTransactionError::Abort(RevisionTxAbort::NotFound))?;
            let mut group: ObjectGroupRecord = utils::decode_model(&group_bytes).map_err(RevisionTxAbort::internal)?;

            let revision = group.revision_counter + 1;
            group.revision_counter = revision;
            group.head_id = revision_id.to_string();

            let row = RevisionRecord {
                id: revision_id.to_string(),
                object_group_id: object_group_id.to_string(),
                revision,
                payload: payload.clone(),
                created_at,
            };
            let row_key = utils::encode_uuid_u64_prefix(PREFIX_REVISION, object_group_id, revision);
            tx.insert(&group_key[..], utils::encode_model(&group).map_err(RevisionTxAbort::internal)?)?;
            tx.insert(&row_key[..], utils::encode_model(&row).map_err(RevisionTxAbort::internal)?)?;
            Ok(revision)
        });

        match res {
            Ok(revision) => Ok((revision_id, revision)),
            Err(TransactionError::Abort(RevisionTxAbort::NotFound)) => Err(AppError::ResourceNotFound.into()),
            Err(TransactionError::Abort(RevisionTxAbort::Internal(msg))) => Err(anyhow!("error in revision transaction: {}", msg)),
            Err(TransactionError::Storage(err)) => Err(anyhow::Error::from(err).context("storage error in revision transaction")),
        }
    }
}

/// The abort reasons of the revision append transaction.
#[derive(Debug)]
enum RevisionTxAbort {
    /// The target object group does not exist.
    NotFound,
    /// A model codec failure, which indicates data corruption.
    Internal(String),
}

impl RevisionTxAbort {
    fn internal(err: anyhow::Error) -> ConflictableTransactionError<Self> {
        ConflictableTransactionError::Abort(Self::Internal(err.to_string()))
    }
}
