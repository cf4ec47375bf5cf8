use crate::error::Error;
use arbor_core::{
    config::EngineConfig,
    db::{
        cascade::{CascadeReport, DependentDeleteCascader, RowState},
        query::{Parameters, QueryCompilation, QueryPlanner, QueryResult},
        row::Row,
        scope::ConnectionScope,
        store::StoreClient,
        write::{GraphWriter, PendingObject},
    },
    error::InternalError,
    key::Key,
    model::MetadataProvider,
};

///
/// Engine
/// Public facade over the planner, the write path, and the delete cascader.
/// Converts core errors into `arbor::Error`.
///

pub struct Engine<'m, M: MetadataProvider + ?Sized> {
    config: EngineConfig,
    metadata: &'m M,
    planner: QueryPlanner,
    cascader: DependentDeleteCascader<'m, M>,
}

impl<'m, M: MetadataProvider + ?Sized> Engine<'m, M> {
    /// Create an engine over `metadata` after validating `config`.
    pub fn new(metadata: &'m M, config: EngineConfig) -> Result<Self, Error> {
        config
            .validate()
            .map_err(|err| Error::from(InternalError::from(err)))?;

        Ok(Self {
            planner: QueryPlanner::new(config.query.clone()),
            cascader: DependentDeleteCascader::new(metadata, config.cascade),
            config,
            metadata,
        })
    }

    /// Create an engine from a TOML configuration document.
    pub fn from_toml_str(metadata: &'m M, source: &str) -> Result<Self, Error> {
        let config = EngineConfig::from_toml_str(source)
            .map_err(|err| Error::from(InternalError::from(err)))?;

        Self::new(metadata, config)
    }

    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    //
    // Queries
    //

    pub fn query<S>(
        &self,
        scope: &mut ConnectionScope,
        store: &S,
        compilation: &QueryCompilation,
        params: &Parameters,
    ) -> Result<QueryResult, Error>
    where
        S: StoreClient + ?Sized,
    {
        Ok(self.planner.execute(scope, store, compilation, params)?)
    }

    /// Execute and collect every row.
    pub fn query_rows<S>(
        &self,
        scope: &mut ConnectionScope,
        store: &S,
        compilation: &QueryCompilation,
        params: &Parameters,
    ) -> Result<Vec<Row>, Error>
    where
        S: StoreClient + ?Sized,
    {
        Ok(self
            .planner
            .execute(scope, store, compilation, params)?
            .into_rows()?)
    }

    pub fn query_unique<S>(
        &self,
        scope: &mut ConnectionScope,
        store: &S,
        compilation: &QueryCompilation,
        params: &Parameters,
    ) -> Result<Option<Row>, Error>
    where
        S: StoreClient + ?Sized,
    {
        Ok(self
            .planner
            .execute_unique(scope, store, compilation, params)?)
    }

    //
    // Writes
    //

    /// Write an object graph, parents before their owned children.
    pub fn insert<S>(
        &self,
        scope: &mut ConnectionScope,
        store: &mut S,
        object: PendingObject,
    ) -> Result<Key, Error>
    where
        S: StoreClient + ?Sized,
    {
        Ok(GraphWriter::new(self.metadata).insert(scope, store, object)?)
    }

    /// Cascade, then delete `owner`.
    pub fn delete<S>(
        &self,
        scope: &ConnectionScope,
        store: &mut S,
        row_state: &RowState,
        owner: &Row,
    ) -> Result<CascadeReport, Error>
    where
        S: StoreClient + ?Sized,
    {
        Ok(self.cascader.delete(scope, store, row_state, owner)?)
    }
}
