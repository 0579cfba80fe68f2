//! Common test utilities for tdbulk integration tests.
//!
//! [`FixtureEngine`] is an in-memory engine speaking [`TransferProtocol`].
//! Tables live in a shared [`Catalog`], so rows loaded through one session
//! can be exported again through another.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tdbulk::connection::NegotiatedAttribute;
use tdbulk::error::TransportError;
use tdbulk::transport::{
    ConnectionParams, InitiateReply, NegotiationReply, Operator, PutReply, RemoteRejection,
    SchemaReply,
};
use tdbulk::{
    BufferBuilder, Column, ColumnSchema, Record, RowBuffer, RowEncoder, SessionAttributes,
    TransferProtocol, Value,
};

/// Engine error code for a missing table.
pub const OBJECT_MISSING: i32 = 3807;
/// Engine error code for a row refused during load.
pub const ROW_REFUSED: i32 = 2673;

pub struct Table {
    pub schema: ColumnSchema,
    pub rows: Vec<Vec<Value>>,
}

/// Tables and an activity log shared by every fixture session.
#[derive(Default)]
pub struct CatalogState {
    pub tables: HashMap<String, Table>,
    pub negotiated: Vec<(Operator, Vec<String>)>,
    pub terminated: usize,
    pub aborted: usize,
}

pub type Catalog = Arc<Mutex<CatalogState>>;

pub fn catalog() -> Catalog {
    Arc::new(Mutex::new(CatalogState::default()))
}

pub fn dbcinfo_schema() -> ColumnSchema {
    ColumnSchema::new(vec![
        Column::varchar("InfoKey", 30).not_null(),
        Column::varchar("InfoData", 16384),
    ])
}

/// Catalog holding `dbc.dbcinfo` with its usual 3 rows.
pub fn dbcinfo_catalog() -> Catalog {
    let catalog = catalog();
    add_table(
        &catalog,
        "dbc.dbcinfo",
        dbcinfo_schema(),
        vec![
            vec![Value::from("LANGUAGE SUPPORT MODE"), Value::from("Standard")],
            vec![Value::from("RELEASE"), Value::from("16.20.53.09")],
            vec![Value::from("VERSION"), Value::from("16.20.53.09")],
        ],
    );
    catalog
}

pub fn add_table(catalog: &Catalog, name: &str, schema: ColumnSchema, rows: Vec<Vec<Value>>) {
    catalog
        .lock()
        .unwrap()
        .tables
        .insert(name.to_lowercase(), Table { schema, rows });
}

pub fn table_rows(catalog: &Catalog, name: &str) -> Vec<Vec<Value>> {
    catalog.lock().unwrap().tables[&name.to_lowercase()].rows.clone()
}

pub fn attributes() -> SessionAttributes {
    SessionAttributes::builder()
        .host("fixture")
        .username("dbc")
        .password("dbc")
        .sessions(2, 5)
        .build()
        .unwrap()
}

/// In-memory engine.
pub struct FixtureEngine {
    catalog: Catalog,
    connected: bool,
    /// Replies of `queued` before the job starts
    pub queued: u32,
    pub sessions: u32,
    /// Reject this attribute (wire name) on the next negotiation only
    pub reject_attribute: Option<(String, i32)>,
    /// Rows per exported buffer
    pub rows_per_buffer: usize,
    /// Drop the last byte of the last exported buffer
    pub truncate_last_buffer: bool,
    /// Refuse loaded rows whose first field equals this value
    pub refuse_key: Option<Value>,
    pub completion_code: u16,
    target: Option<String>,
    pending: VecDeque<RowBuffer>,
}

impl FixtureEngine {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog,
            connected: false,
            queued: 0,
            sessions: 4,
            reject_attribute: None,
            rows_per_buffer: 2,
            truncate_last_buffer: false,
            refuse_key: None,
            completion_code: 0,
            target: None,
            pending: VecDeque::new(),
        }
    }

    fn missing(name: &str) -> SchemaReply {
        SchemaReply::Rejected {
            code: OBJECT_MISSING,
            message: format!("Object '{}' does not exist.", name),
        }
    }

    fn encode_table(&self, table: &Table) -> VecDeque<RowBuffer> {
        let encoder = RowEncoder::new();
        let mut buffers: VecDeque<RowBuffer> = table
            .rows
            .chunks(self.rows_per_buffer.max(1))
            .map(|chunk| {
                let mut builder = BufferBuilder::new(64260);
                for row in chunk {
                    let body = encoder.encode(row, &table.schema).unwrap();
                    assert!(builder.push(&body));
                }
                builder.finish()
            })
            .collect();

        if self.truncate_last_buffer {
            if let Some(last) = buffers.pop_back() {
                let mut bytes = last.into_bytes();
                bytes.pop();
                buffers.push_back(RowBuffer::from_bytes(bytes));
            }
        }
        buffers
    }
}

#[async_trait]
impl TransferProtocol for FixtureEngine {
    async fn connect(&mut self, _params: &ConnectionParams) -> Result<(), TransportError> {
        self.connected = true;
        Ok(())
    }

    async fn negotiate(
        &mut self,
        operator: Operator,
        attributes: &[NegotiatedAttribute],
    ) -> Result<NegotiationReply, TransportError> {
        self.catalog.lock().unwrap().negotiated.push((
            operator,
            attributes.iter().map(|a| a.wire_name.to_string()).collect(),
        ));
        match self.reject_attribute.take() {
            Some((wire_name, code)) => Ok(NegotiationReply::Rejected { wire_name, code }),
            None => Ok(NegotiationReply::Accepted),
        }
    }

    async fn initiate(&mut self) -> Result<InitiateReply, TransportError> {
        if self.queued > 0 {
            self.queued -= 1;
            return Ok(InitiateReply::Queued);
        }
        Ok(InitiateReply::Ready {
            sessions: self.sessions,
        })
    }

    async fn set_query(&mut self, sql: &str) -> Result<SchemaReply, TransportError> {
        let name = sql
            .to_lowercase()
            .strip_prefix("select * from ")
            .map(|s| s.trim().to_string())
            .unwrap_or_default();

        let buffers = {
            let catalog = self.catalog.lock().unwrap();
            match catalog.tables.get(&name) {
                Some(table) => Some((table.schema.clone(), self.encode_table(table))),
                None => None,
            }
        };
        match buffers {
            Some((schema, pending)) => {
                self.pending = pending;
                Ok(SchemaReply::Ready(schema))
            }
            None => Ok(Self::missing(&name)),
        }
    }

    async fn set_target(&mut self, table: &str) -> Result<SchemaReply, TransportError> {
        let name = table.to_lowercase();
        let schema = self
            .catalog
            .lock()
            .unwrap()
            .tables
            .get(&name)
            .map(|t| t.schema.clone());
        match schema {
            Some(schema) => {
                self.target = Some(name);
                Ok(SchemaReply::Ready(schema))
            }
            None => Ok(Self::missing(table)),
        }
    }

    async fn get_buffer(&mut self) -> Result<Option<RowBuffer>, TransportError> {
        Ok(self.pending.pop_front())
    }

    async fn put_buffer(&mut self, buffer: RowBuffer) -> Result<PutReply, TransportError> {
        let target = self.target.clone().ok_or(TransportError::NotConnected)?;
        let mut catalog = self.catalog.lock().unwrap();
        let table = catalog
            .tables
            .get_mut(&target)
            .ok_or_else(|| TransportError::InvalidResponse("no target".to_string()))?;

        let mut reply = PutReply::default();
        let encoder = RowEncoder::new();
        for (row_index, record) in encoder.decode(&buffer, &table.schema).enumerate() {
            let values = match record {
                Ok(Record::Values(values)) => values,
                other => {
                    return Err(TransportError::InvalidResponse(format!(
                        "undecodable row {}: {:?}",
                        row_index, other
                    )))
                }
            };
            if self.refuse_key.as_ref() == values.first() {
                reply.rejected.push(RemoteRejection {
                    row_index,
                    code: ROW_REFUSED,
                    reason: "Duplicate unique prime key".to_string(),
                });
            } else {
                table.rows.push(values);
                reply.accepted += 1;
            }
        }
        Ok(reply)
    }

    async fn terminate(&mut self) -> Result<u16, TransportError> {
        self.connected = false;
        self.catalog.lock().unwrap().terminated += 1;
        Ok(self.completion_code)
    }

    fn abort(&mut self) {
        if self.connected {
            self.catalog.lock().unwrap().aborted += 1;
        }
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

/// Install a test subscriber once; set `RUST_LOG` to see session logs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
