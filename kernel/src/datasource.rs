//! The data source entry point: read relations and the transactional write path.
//!
//! A write runs strictly in sequence:
//!
//! 1. resolve options and validate everything that can be validated without storage (enum
//!    options, canonical schema, key generator, precombine field, read view, catalog settings),
//! 2. probe table existence and resolve the save mode, which may abort or skip the call,
//! 3. run the record pipeline (and combine duplicate keys for upserts),
//! 4. delete and/or initialize the table as the save mode requires,
//! 5. begin a transaction, write the records, validate the outcomes and commit or abort,
//! 6. publish to the catalog if the commit went through and sync is enabled.
//!
//! Configuration, precondition and schema errors all surface in steps 1 to 3, before anything
//! on storage changes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, instrument, warn, Level};

use crate::catalog::{publish, CatalogPublisher, CatalogSyncStatus, SyncDescriptor};
use crate::commit::{validate_and_commit, CommitDecision};
use crate::keygen::KeyGeneratorRegistry;
use crate::metrics::{MetricEvent, MetricId};
use crate::mode::{resolve_mode, ModeAction, SaveMode, TableExistence};
use crate::options::{
    resolve_options, CatalogSyncPolicy, OperationKind, OptionScope, PayloadKind, ResolvedOptions,
    StorageType,
};
use crate::pipeline::{combine_records, RecordPipeline};
use crate::record::{CanonicalRecord, CanonicalSchema};
use crate::relation::{RelationDescriptor, WriteRelation, WriteStatus};
use crate::schema::SchemaRef;
use crate::table::{delete_table_recursively, initialize_table, probe_existence, TableLayout};
use crate::transaction::{
    ClientContext, FileSystemTransactionClientFactory, ScopedClient, TransactionClient,
    TransactionClientFactory,
};
use crate::value::RowBatch;
use crate::{Engine, Error, TableResult};

/// Creates read and write relations over tables reachable through an [`Engine`].
///
/// By default writes go through a [`FileSystemTransactionClientFactory`], resolve key generators
/// from [`KeyGeneratorRegistry::default`] and have no catalog publisher.
pub struct DataSource<'a> {
    engine: &'a dyn Engine,
    client_factory: Arc<dyn TransactionClientFactory>,
    key_generators: KeyGeneratorRegistry,
    catalog_publisher: Option<Arc<dyn CatalogPublisher>>,
}

/// Everything a write needs, settled before storage is touched.
struct WritePlan {
    options: ResolvedOptions,
    layout: TableLayout,
    table_name: String,
    schema: Arc<CanonicalSchema>,
    operation: OperationKind,
    storage_type: StorageType,
    combine_with: Option<PayloadKind>,
    verbose: bool,
    catalog_sync: Option<(SyncDescriptor, CatalogSyncPolicy)>,
    pipeline: Arc<RecordPipeline>,
    relation: RelationDescriptor,
}

impl<'a> DataSource<'a> {
    pub fn new(engine: &'a dyn Engine) -> Self {
        Self {
            engine,
            client_factory: Arc::new(FileSystemTransactionClientFactory),
            key_generators: KeyGeneratorRegistry::default(),
            catalog_publisher: None,
        }
    }

    /// Use `factory` to create transaction clients.
    pub fn with_client_factory(mut self, factory: Arc<dyn TransactionClientFactory>) -> Self {
        self.client_factory = factory;
        self
    }

    /// Resolve key generators from `registry`.
    pub fn with_key_generators(mut self, registry: KeyGeneratorRegistry) -> Self {
        self.key_generators = registry;
        self
    }

    /// Publish committed writes through `publisher` when catalog sync is enabled.
    pub fn with_catalog_publisher(mut self, publisher: Arc<dyn CatalogPublisher>) -> Self {
        self.catalog_publisher = Some(publisher);
        self
    }

    /// A descriptor for reading the table at `path`, leaving the schema to be inferred.
    #[instrument(skip_all)]
    pub fn create_read_relation(
        &self,
        options: &HashMap<String, String>,
    ) -> TableResult<RelationDescriptor> {
        let options = resolve_options(options, OptionScope::Read)?;
        RelationDescriptor::try_new(options, None)
    }

    /// A descriptor for reading the table at `path` with a caller-supplied schema.
    #[instrument(skip_all)]
    pub fn create_read_relation_with_schema(
        &self,
        options: &HashMap<String, String>,
        schema: SchemaRef,
    ) -> TableResult<RelationDescriptor> {
        let options = resolve_options(options, OptionScope::Read)?;
        RelationDescriptor::try_new(options, Some(schema))
    }

    /// Write `rows` to the table described by `options`, honoring `mode`.
    ///
    /// Errors are returned only for failures that prevent a verdict on the write: invalid
    /// configuration, a precondition such as an existing table under
    /// [`SaveMode::ErrorIfExists`], rows that do not fit the schema, storage errors, and catalog
    /// failures under the strict sync policy. Records that fail to write do not produce an error;
    /// they are reported as [`WriteStatus::Failed`] next to a descriptor for the table.
    #[instrument(skip_all, fields(%mode, rows = rows.len()))]
    pub fn create_write_relation(
        &self,
        options: &HashMap<String, String>,
        mode: SaveMode,
        rows: RowBatch,
    ) -> TableResult<WriteRelation> {
        let operation_id = MetricId::new();
        let reporter = self.engine.get_metrics_reporter();
        let report = |event: MetricEvent| {
            if let Some(r) = &reporter {
                r.report(event);
            }
        };

        let plan = self.plan_write(options, rows.schema().clone())?;
        let storage = self.engine.storage_handler();
        let existence = probe_existence(storage.as_ref(), &plan.layout)?;
        let action = resolve_mode(mode, existence);
        info!(base_path = %plan.layout.base_path(), ?existence, ?action, "resolved save mode");
        match action {
            ModeAction::Abort => {
                return Err(Error::precondition(format!(
                    "Table already exists at {}",
                    plan.layout.base_path()
                )))
            }
            ModeAction::Skip => {
                info!("table exists, skipping write");
                // the batch schema says nothing about the table that is already there
                return Ok(WriteRelation {
                    relation: RelationDescriptor {
                        schema: None,
                        ..plan.relation
                    },
                    status: WriteStatus::Skipped,
                });
            }
            ModeAction::DeleteAndInitialize | ModeAction::Initialize | ModeAction::Proceed => {}
        }

        let records = self.run_pipeline(&plan, rows, operation_id, &report)?;

        if action == ModeAction::DeleteAndInitialize {
            let start = Instant::now();
            let removed = delete_table_recursively(storage.as_ref(), &plan.layout)?;
            report(MetricEvent::TableDeleted {
                operation_id,
                duration: start.elapsed(),
                num_files: removed,
            });
            if probe_existence(storage.as_ref(), &plan.layout)? == TableExistence::Exists {
                return Err(Error::precondition(format!(
                    "Table at {} still exists after deletion",
                    plan.layout.base_path()
                )));
            }
        }
        if matches!(
            action,
            ModeAction::DeleteAndInitialize | ModeAction::Initialize
        ) {
            initialize_table(
                storage.as_ref(),
                &plan.layout,
                &plan.table_name,
                plan.storage_type,
            )?;
            report(MetricEvent::TableInitialized { operation_id });
        }

        let context = ClientContext {
            base_path: plan.layout.base_path().clone(),
            table_name: plan.table_name.clone(),
            schema: plan.schema.clone(),
            options: plan.options.clone(),
        };
        let mut client = ScopedClient::new(self.client_factory.create(self.engine, context)?);
        let status = self.run_transaction(&mut client, &plan, records, operation_id, &report);
        if let Err(e) = client.close() {
            warn!("failed to close transaction client: {e}");
        }
        Ok(WriteRelation {
            relation: plan.relation,
            status: status?,
        })
    }

    fn plan_write(
        &self,
        raw: &HashMap<String, String>,
        schema: SchemaRef,
    ) -> TableResult<WritePlan> {
        let options = resolve_options(raw, OptionScope::Write)?;
        let table_name = options.table_name()?.trim().to_string();
        let operation = options.operation()?;
        let storage_type = options.storage_type()?;
        let payload_kind = options.payload_kind()?;
        let combine_with = (operation == OperationKind::Upsert
            && options.combine_before_upsert()?)
        .then_some(payload_kind);
        let verbose = options.verbose_errors()? || tracing::enabled!(Level::TRACE);

        let catalog_sync = if options.catalog_sync_enabled()? {
            let descriptor = SyncDescriptor::from_options(&options)?;
            let policy = options.catalog_sync_policy()?;
            if self.catalog_publisher.is_none() {
                match policy {
                    CatalogSyncPolicy::Strict => {
                        return Err(Error::configuration(
                            "catalog sync is enabled with the strict policy but no catalog \
                             publisher is configured",
                        ))
                    }
                    CatalogSyncPolicy::BestEffort => {
                        warn!("catalog sync is enabled but no catalog publisher is configured")
                    }
                }
            }
            Some((descriptor, policy))
        } else {
            None
        };

        let schema = Arc::new(CanonicalSchema::try_new(&table_name, schema)?);
        let key_generator = self.key_generators.resolve(&options)?;
        let pipeline = Arc::new(RecordPipeline::try_new(
            schema.clone(),
            &options,
            key_generator,
        )?);
        let relation = RelationDescriptor::try_new(options.clone(), Some(schema.schema.clone()))?;
        Ok(WritePlan {
            layout: TableLayout::new(relation.base_path.clone()),
            options,
            table_name,
            schema,
            operation,
            storage_type,
            combine_with,
            verbose,
            catalog_sync,
            pipeline,
            relation,
        })
    }

    fn run_pipeline(
        &self,
        plan: &WritePlan,
        rows: RowBatch,
        operation_id: MetricId,
        report: &dyn Fn(MetricEvent),
    ) -> TableResult<Vec<CanonicalRecord>> {
        let start = Instant::now();
        let (_, rows) = rows.into_parts();
        let num_rows = rows.len();
        let mut records = self
            .engine
            .row_processor()
            .process(plan.pipeline.clone(), rows)?;
        if records.len() != num_rows {
            return Err(Error::internal_error(format!(
                "row processor returned {} records for {num_rows} rows",
                records.len()
            )));
        }
        if let Some(kind) = plan.combine_with {
            records = combine_records(records, kind)?;
        }
        debug!(num_rows, num_records = records.len(), "record pipeline finished");
        report(MetricEvent::PipelineCompleted {
            operation_id,
            duration: start.elapsed(),
            num_rows: num_rows as u64,
            num_records: records.len() as u64,
        });
        Ok(records)
    }

    fn run_transaction(
        &self,
        client: &mut ScopedClient,
        plan: &WritePlan,
        records: Vec<CanonicalRecord>,
        operation_id: MetricId,
        report: &dyn Fn(MetricEvent),
    ) -> TableResult<WriteStatus> {
        let start = Instant::now();
        let num_records = records.len() as u64;
        let txn = client.start_transaction()?;
        let outcomes = client.perform_operation(plan.operation, records, &txn)?;
        let decision = validate_and_commit(client, &txn, outcomes, &plan.options, plan.verbose)?;
        let commit = match decision {
            CommitDecision::Aborted(failure) => {
                report(MetricEvent::CommitAborted {
                    operation_id,
                    transaction_id: txn.to_string(),
                    error_count: failure.error_count as u64,
                });
                return Ok(WriteStatus::Failed(failure));
            }
            CommitDecision::Committed(commit) if !commit.success => {
                return Ok(WriteStatus::CommitRejected(commit))
            }
            CommitDecision::Committed(commit) => commit,
        };
        report(MetricEvent::CommitCompleted {
            operation_id,
            transaction_id: txn.to_string(),
            duration: start.elapsed(),
            num_records,
        });
        let catalog_sync = self.sync_catalog(plan, operation_id, report)?;
        Ok(WriteStatus::Committed {
            commit,
            catalog_sync,
        })
    }

    fn sync_catalog(
        &self,
        plan: &WritePlan,
        operation_id: MetricId,
        report: &dyn Fn(MetricEvent),
    ) -> TableResult<CatalogSyncStatus> {
        let Some((descriptor, policy)) = &plan.catalog_sync else {
            return Ok(CatalogSyncStatus::Disabled);
        };
        let Some(publisher) = &self.catalog_publisher else {
            // strict sync without a publisher was rejected while planning
            return Ok(CatalogSyncStatus::Failed(
                "no catalog publisher configured".to_string(),
            ));
        };
        let start = Instant::now();
        let result = publish(publisher.as_ref(), descriptor, *policy);
        report(MetricEvent::CatalogSyncCompleted {
            operation_id,
            duration: start.elapsed(),
            success: matches!(result, Ok(CatalogSyncStatus::Synced)),
        });
        result
    }
}
