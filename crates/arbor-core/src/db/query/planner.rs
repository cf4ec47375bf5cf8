use crate::{
    config::QueryConfig,
    db::{
        query::{
            compile::{CandidateSource, Parameters, QueryCompilation},
            cursor::ResultCursor,
            descriptor::ScanDescriptor,
            eval::evaluate,
            translate::{QueryTranslator, Translation},
        },
        response::ResponseError,
        row::Row,
        scope::ConnectionScope,
        store::StoreClient,
    },
    error::InternalError,
    obs::sink::{self, ExecKind, MetricsEvent, PathKind, Span},
};

///
/// QueryResult
///
/// Lazy, forward-only result sequence. Restarting means executing again.
///

#[derive(Debug)]
pub struct QueryResult {
    inner: ResultInner,
    path: PathKind,
}

#[derive(Debug)]
enum ResultInner {
    Cursor(ResultCursor),
    Rows(std::vec::IntoIter<Row>),
}

impl QueryResult {
    const fn cursor(cursor: ResultCursor) -> Self {
        Self {
            inner: ResultInner::Cursor(cursor),
            path: PathKind::Native,
        }
    }

    fn rows(rows: Vec<Row>, path: PathKind) -> Self {
        Self {
            inner: ResultInner::Rows(rows.into_iter()),
            path,
        }
    }

    /// Execution path the planner chose.
    #[must_use]
    pub const fn path(&self) -> PathKind {
        self.path
    }

    #[must_use]
    pub const fn is_native(&self) -> bool {
        matches!(self.path, PathKind::Native)
    }

    /// Underlying store cursor for lazily streamed native results.
    #[must_use]
    pub const fn store_cursor(&self) -> Option<&ResultCursor> {
        match &self.inner {
            ResultInner::Cursor(cursor) => Some(cursor),
            ResultInner::Rows(_) => None,
        }
    }

    /// Consume the sequence, failing on the first fetch error.
    pub fn into_rows(self) -> Result<Vec<Row>, InternalError> {
        self.collect()
    }
}

impl Iterator for QueryResult {
    type Item = Result<Row, InternalError>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.inner {
            ResultInner::Cursor(cursor) => cursor.next(),
            ResultInner::Rows(rows) => rows.next().map(Ok),
        }
    }
}

///
/// QueryPlanner
///
/// Chooses native or in-memory execution per query and runs it.
///

#[derive(Clone, Debug, Default)]
pub struct QueryPlanner {
    config: QueryConfig,
    translator: QueryTranslator,
}

impl QueryPlanner {
    #[must_use]
    pub const fn new(config: QueryConfig) -> Self {
        let translator = QueryTranslator::with_default_preference(config.execution);

        Self { config, translator }
    }

    #[must_use]
    pub const fn translator(&self) -> &QueryTranslator {
        &self.translator
    }

    /// Execute a compiled query within `scope`.
    ///
    /// Native results stream from the store and are disconnected by the
    /// scope's lifecycle events. Unique queries are fully checked before
    /// returning, so a violation never yields a partial result.
    pub fn execute<S>(
        &self,
        scope: &mut ConnectionScope,
        store: &S,
        compilation: &QueryCompilation,
        params: &Parameters,
    ) -> Result<QueryResult, InternalError>
    where
        S: StoreClient + ?Sized,
    {
        self.execute_inner(scope, store, compilation, params, compilation.unique)
    }

    /// Execute and return the single matching row, if any.
    pub fn execute_unique<S>(
        &self,
        scope: &mut ConnectionScope,
        store: &S,
        compilation: &QueryCompilation,
        params: &Parameters,
    ) -> Result<Option<Row>, InternalError>
    where
        S: StoreClient + ?Sized,
    {
        let mut result = self.execute_inner(scope, store, compilation, params, true)?;

        result.next().transpose()
    }

    fn execute_inner<S>(
        &self,
        scope: &mut ConnectionScope,
        store: &S,
        compilation: &QueryCompilation,
        params: &Parameters,
        unique: bool,
    ) -> Result<QueryResult, InternalError>
    where
        S: StoreClient + ?Sized,
    {
        let kind = compilation.kind.as_str();
        let mut span = Span::new(ExecKind::Query, kind);

        match self.translator.translate(compilation, params)? {
            Translation::Native(scan) => {
                sink::record(MetricsEvent::Plan {
                    kind,
                    path: PathKind::Native,
                });
                tracing::debug!(
                    kind,
                    filters = scan.filters.len(),
                    sorts = scan.sorts.len(),
                    "executing natively"
                );

                let source = store
                    .run_native_query(&scan)
                    .map_err(|err| InternalError::query_execution(kind, err))?;
                let cursor = ResultCursor::new(kind, source, self.config.cursor_batch_size);

                if unique {
                    let rows = take_unique(kind, cursor)?;
                    span.set_rows(rows.len() as u64);

                    return Ok(QueryResult::rows(rows, PathKind::Native));
                }

                scope.track_cursor(&cursor);
                Ok(QueryResult::cursor(cursor))
            }
            Translation::Refused(_) => {
                sink::record(MetricsEvent::Plan {
                    kind,
                    path: PathKind::InMemory,
                });

                let candidates = self.materialize(store, compilation)?;
                sink::record(MetricsEvent::RowsScanned {
                    kind,
                    rows_scanned: candidates.len() as u64,
                });

                let rows = evaluate(
                    candidates,
                    compilation.filter.as_ref(),
                    &compilation.ordering,
                    compilation.range,
                    params,
                )?;
                if unique && rows.len() > 1 {
                    return Err(unique_violation(kind, rows.len()));
                }
                span.set_rows(rows.len() as u64);

                Ok(QueryResult::rows(rows, PathKind::InMemory))
            }
        }
    }

    // Pull every candidate row into memory.
    fn materialize<S>(
        &self,
        store: &S,
        compilation: &QueryCompilation,
    ) -> Result<Vec<Row>, InternalError>
    where
        S: StoreClient + ?Sized,
    {
        let kind = compilation.kind.as_str();

        let rows = match &compilation.candidates {
            CandidateSource::Collection(rows) => rows.clone(),
            CandidateSource::Extent(extent) if extent.rows.is_some() => {
                extent.rows.clone().unwrap_or_default()
            }
            CandidateSource::Scan | CandidateSource::Extent(_) => {
                return self.scan_kind(store, kind);
            }
        };
        self.check_candidate_cap(kind, rows.len())?;

        Ok(rows)
    }

    fn scan_kind<S>(&self, store: &S, kind: &str) -> Result<Vec<Row>, InternalError>
    where
        S: StoreClient + ?Sized,
    {
        let mut cursor = store
            .run_native_query(&ScanDescriptor::full_kind(kind))
            .map_err(|err| InternalError::query_execution(kind, err))?;

        let mut rows = Vec::new();
        loop {
            let batch = cursor
                .next_batch(self.config.cursor_batch_size)
                .map_err(|err| InternalError::query_execution(kind, err))?;
            if batch.is_empty() {
                return Ok(rows);
            }
            rows.extend(batch);
            self.check_candidate_cap(kind, rows.len())?;
        }
    }

    fn check_candidate_cap(&self, kind: &str, count: usize) -> Result<(), InternalError> {
        match self.config.max_in_memory_candidates {
            Some(cap) if count > cap => Err(InternalError::query_unsupported(format!(
                "in-memory evaluation of '{kind}' exceeds the candidate cap of {cap} rows"
            ))),
            _ => Ok(()),
        }
    }
}

// Pull at most two rows; a second row is a violation.
fn take_unique(kind: &str, cursor: ResultCursor) -> Result<Vec<Row>, InternalError> {
    let rows = cursor.take(2).collect::<Result<Vec<_>, _>>()?;
    if rows.len() > 1 {
        return Err(unique_violation(kind, rows.len()));
    }

    Ok(rows)
}

fn unique_violation(kind: &str, count: usize) -> InternalError {
    sink::record(MetricsEvent::UniqueViolation { kind });

    ResponseError::not_unique(kind, count).into()
}
