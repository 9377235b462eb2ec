//! Command line surface. Each subcommand maps to one `Controller` action and
//! prints its result as JSON.

use crate::db::{
    MarkingCodeChanges, NewConnection, NewCredential, NewNomenclature, NewOrder, ReferenceKind,
};
use crate::error::OmsError;
use crate::service::controller::{Controller, OrdersView};
use crate::service::report::{AggregationOptions, UtilisationOptions};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "znak-oms")]
#[command(version, about = "Client for the marking registry order management API", long_about = None)]
pub struct Cli {
    /// Overrides `database_url` from config/environment
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Database maintenance
    Db {
        #[command(subcommand)]
        action: DbAction,
    },
    /// Lookup tables: extensions, countries, order statuses, usage types
    Lookup {
        #[arg(value_enum)]
        table: LookupTable,
        #[command(subcommand)]
        action: LookupAction,
    },
    /// OMS connections
    Connection {
        #[command(subcommand)]
        action: ConnectionAction,
    },
    /// Client tokens
    Credential {
        #[command(subcommand)]
        action: CredentialAction,
    },
    /// Products known to the client
    Nomenclature {
        #[command(subcommand)]
        action: NomenclatureAction,
    },
    /// Locally composed emission orders
    Order {
        #[command(subcommand)]
        action: OrderAction,
    },
    /// Cached marking codes
    Code {
        #[command(subcommand)]
        action: CodeAction,
    },
    /// Vendor aggregation files
    Aggregation {
        #[command(subcommand)]
        action: AggregationAction,
    },
    /// Calls against the OMS
    Api {
        #[command(subcommand)]
        action: ApiAction,
    },
    /// Logged OMS exchanges
    Logs {
        #[command(subcommand)]
        action: LogsAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum DbAction {
    /// Row counts per table and columns still missing
    Status,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum LookupTable {
    Extension,
    Country,
    OrderStatus,
    UsageType,
}

impl From<LookupTable> for ReferenceKind {
    fn from(t: LookupTable) -> Self {
        match t {
            LookupTable::Extension => ReferenceKind::Extension,
            LookupTable::Country => ReferenceKind::Country,
            LookupTable::OrderStatus => ReferenceKind::OrderStatus,
            LookupTable::UsageType => ReferenceKind::UsageType,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum LookupAction {
    List,
    Add {
        #[arg(long)]
        code: String,
        #[arg(long)]
        name: String,
    },
    Edit {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        code: String,
        #[arg(long)]
        name: String,
    },
    Delete {
        #[arg(long)]
        id: i64,
    },
}

#[derive(Args, Debug)]
pub struct ConnectionFields {
    #[arg(long)]
    pub name: String,
    /// OMS host, e.g. https://suz.sandbox.crptech.ru
    #[arg(long)]
    pub base_url: String,
    #[arg(long)]
    pub oms_id: String,
    /// Default extension for calls through this connection
    #[arg(long)]
    pub extension: Option<String>,
    /// Participant INN used in aggregation reports
    #[arg(long)]
    pub participant_id: Option<String>,
}

impl From<ConnectionFields> for NewConnection {
    fn from(f: ConnectionFields) -> Self {
        NewConnection {
            name: f.name,
            base_url: f.base_url,
            oms_id: f.oms_id,
            extension_code: f.extension,
            participant_id: f.participant_id,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum ConnectionAction {
    List,
    Add(ConnectionFields),
    Edit {
        #[arg(long)]
        id: i64,
        #[command(flatten)]
        fields: ConnectionFields,
    },
    Delete {
        #[arg(long)]
        id: i64,
    },
}

#[derive(Args, Debug)]
pub struct CredentialFields {
    #[arg(long)]
    pub name: String,
    #[arg(long)]
    pub token: String,
    #[arg(long)]
    pub connection: Option<i64>,
}

impl From<CredentialFields> for NewCredential {
    fn from(f: CredentialFields) -> Self {
        NewCredential {
            name: f.name,
            client_token: f.token,
            connection_id: f.connection,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum CredentialAction {
    List,
    Add(CredentialFields),
    Edit {
        #[arg(long)]
        id: i64,
        #[command(flatten)]
        fields: CredentialFields,
    },
    Delete {
        #[arg(long)]
        id: i64,
    },
}

#[derive(Args, Debug)]
pub struct NomenclatureFields {
    #[arg(long)]
    pub gtin: String,
    #[arg(long)]
    pub name: String,
    #[arg(long)]
    pub extension: Option<String>,
    #[arg(long)]
    pub template_id: Option<i64>,
    #[arg(long)]
    pub country: Option<String>,
}

impl From<NomenclatureFields> for NewNomenclature {
    fn from(f: NomenclatureFields) -> Self {
        NewNomenclature {
            gtin: f.gtin,
            name: f.name,
            extension_code: f.extension,
            template_id: f.template_id,
            country_code: f.country,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum NomenclatureAction {
    List,
    Add(NomenclatureFields),
    Edit {
        #[arg(long)]
        id: i64,
        #[command(flatten)]
        fields: NomenclatureFields,
    },
    Delete {
        #[arg(long)]
        id: i64,
    },
}

#[derive(Args, Debug)]
pub struct OrderFields {
    #[arg(long)]
    pub connection: i64,
    #[arg(long)]
    pub extension: String,
    #[arg(long)]
    pub gtin: String,
    #[arg(long)]
    pub quantity: i64,
    #[arg(long, default_value = "OPERATOR")]
    pub serial_number_type: String,
    #[arg(long)]
    pub template_id: Option<i64>,
    #[arg(long, default_value = "UNIT")]
    pub cis_type: String,
    #[arg(long)]
    pub comment: Option<String>,
}

impl From<OrderFields> for NewOrder {
    fn from(f: OrderFields) -> Self {
        NewOrder {
            connection_id: f.connection,
            extension_code: f.extension,
            gtin: f.gtin,
            quantity: f.quantity,
            serial_number_type: f.serial_number_type,
            template_id: f.template_id,
            cis_type: f.cis_type,
            comment: f.comment,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum OrderAction {
    List,
    Add(OrderFields),
    Edit {
        #[arg(long)]
        id: i64,
        #[command(flatten)]
        fields: OrderFields,
    },
    Delete {
        #[arg(long)]
        id: i64,
    },
    /// Send a draft order to the OMS
    Submit {
        #[arg(long)]
        id: i64,
    },
}

#[derive(Subcommand, Debug)]
pub enum CodeAction {
    List {
        /// Server order id
        #[arg(long)]
        order_id: Option<String>,
    },
    /// Store scanned codes
    Add {
        #[arg(long)]
        extension: String,
        #[arg(required = true)]
        codes: Vec<String>,
    },
    /// Replace the editable fields of a stored code
    Edit {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        gtin: Option<String>,
        #[arg(long)]
        order_id: Option<String>,
        #[arg(long)]
        block_id: Option<String>,
        /// EMITTED or REPORTED
        #[arg(long)]
        status: String,
    },
    Delete {
        #[arg(long)]
        id: i64,
    },
}

#[derive(Subcommand, Debug)]
pub enum AggregationAction {
    Import {
        path: PathBuf,
    },
    List,
    Show {
        #[arg(long)]
        id: i64,
    },
    Edit {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        file_name: String,
        /// NEW or SENT; NEW allows reporting the file again
        #[arg(long)]
        status: String,
    },
    Delete {
        #[arg(long)]
        id: i64,
    },
    /// Build and send the aggregation report of an imported file
    Report {
        #[arg(long)]
        id: i64,
        #[command(flatten)]
        target: TargetArgs,
        #[arg(long)]
        participant_id: Option<String>,
        #[arg(long)]
        production_line_id: Option<String>,
        #[arg(long)]
        production_order_id: Option<String>,
    },
}

#[derive(Args, Debug)]
pub struct TargetArgs {
    #[arg(long)]
    pub connection: i64,
    /// Defaults to the connection's extension
    #[arg(long)]
    pub extension: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum ApiAction {
    Ping(TargetArgs),
    /// Pull the server order list into the cache
    Orders(TargetArgs),
    Buffer {
        #[command(flatten)]
        target: TargetArgs,
        #[arg(long)]
        order_id: String,
        #[arg(long)]
        gtin: String,
    },
    /// Download codes from an order buffer
    Codes {
        #[command(flatten)]
        target: TargetArgs,
        #[arg(long)]
        order_id: String,
        #[arg(long)]
        gtin: String,
        #[arg(long)]
        quantity: u32,
    },
    Close {
        #[command(flatten)]
        target: TargetArgs,
        #[arg(long)]
        order_id: String,
        #[arg(long)]
        gtin: String,
    },
    /// Report codes as used; without --code all unreported codes of --order-id are sent
    Utilise {
        #[command(flatten)]
        target: TargetArgs,
        #[arg(long)]
        usage_type: String,
        #[arg(long)]
        order_id: Option<String>,
        #[arg(long = "code")]
        codes: Vec<String>,
        #[arg(long)]
        production_date: Option<String>,
        #[arg(long)]
        expiration_date: Option<String>,
        #[arg(long)]
        series_number: Option<String>,
    },
    ReportStatus {
        #[command(flatten)]
        target: TargetArgs,
        #[arg(long)]
        report_id: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum LogsAction {
    List {
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
    Clear,
}

fn print_json<T: Serialize>(value: &T) -> Result<(), OmsError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Execute one command against the controller.
pub async fn run(command: Commands, ctl: &Controller) -> Result<(), OmsError> {
    match command {
        Commands::Db {
            action: DbAction::Status,
        } => print_json(&ctl.db_status().await?),

        Commands::Lookup { table, action } => {
            let kind = ReferenceKind::from(table);
            match action {
                LookupAction::List => print_json(&ctl.list_reference(kind).await?),
                LookupAction::Add { code, name } => {
                    print_json(&ctl.add_reference(kind, &code, &name).await?)
                }
                LookupAction::Edit { id, code, name } => {
                    print_json(&ctl.edit_reference(kind, id, &code, &name).await?)
                }
                LookupAction::Delete { id } => {
                    ctl.delete_reference(kind, id).await?;
                    print_json(&json!({ "deleted": id }))
                }
            }
        }

        Commands::Connection { action } => match action {
            ConnectionAction::List => print_json(&ctl.list_connections().await?),
            ConnectionAction::Add(fields) => print_json(&ctl.add_connection(fields.into()).await?),
            ConnectionAction::Edit { id, fields } => {
                print_json(&ctl.edit_connection(id, fields.into()).await?)
            }
            ConnectionAction::Delete { id } => {
                ctl.delete_connection(id).await?;
                print_json(&json!({ "deleted": id }))
            }
        },

        Commands::Credential { action } => match action {
            CredentialAction::List => print_json(&ctl.list_credentials().await?),
            CredentialAction::Add(fields) => print_json(&ctl.add_credential(fields.into()).await?),
            CredentialAction::Edit { id, fields } => {
                print_json(&ctl.edit_credential(id, fields.into()).await?)
            }
            CredentialAction::Delete { id } => {
                ctl.delete_credential(id).await?;
                print_json(&json!({ "deleted": id }))
            }
        },

        Commands::Nomenclature { action } => match action {
            NomenclatureAction::List => print_json(&ctl.list_nomenclature().await?),
            NomenclatureAction::Add(fields) => {
                print_json(&ctl.add_nomenclature(fields.into()).await?)
            }
            NomenclatureAction::Edit { id, fields } => {
                print_json(&ctl.edit_nomenclature(id, fields.into()).await?)
            }
            NomenclatureAction::Delete { id } => {
                ctl.delete_nomenclature(id).await?;
                print_json(&json!({ "deleted": id }))
            }
        },

        Commands::Order { action } => match action {
            OrderAction::List => print_json(&ctl.list_orders().await?),
            OrderAction::Add(fields) => print_json(&ctl.add_order(fields.into()).await?),
            OrderAction::Edit { id, fields } => print_json(&ctl.edit_order(id, fields.into()).await?),
            OrderAction::Delete { id } => {
                ctl.delete_order(id).await?;
                print_json(&json!({ "deleted": id }))
            }
            OrderAction::Submit { id } => print_json(&ctl.submit_order(id).await?),
        },

        Commands::Code { action } => match action {
            CodeAction::List { order_id } => print_json(&ctl.list_codes(order_id.as_deref()).await?),
            CodeAction::Add { extension, codes } => {
                let stored = ctl.add_codes(&codes, &extension).await?;
                print_json(&json!({ "received": codes.len(), "stored": stored }))
            }
            CodeAction::Edit {
                id,
                gtin,
                order_id,
                block_id,
                status,
            } => {
                let changes = MarkingCodeChanges {
                    gtin,
                    order_id,
                    block_id,
                    status,
                };
                print_json(&ctl.edit_code(id, changes).await?)
            }
            CodeAction::Delete { id } => {
                ctl.delete_code(id).await?;
                print_json(&json!({ "deleted": id }))
            }
        },

        Commands::Aggregation { action } => match action {
            AggregationAction::Import { path } => {
                let file = ctl.import_aggregation_file(&path).await?;
                let buckets = file.buckets()?;
                print_json(&json!({
                    "id": file.id,
                    "file_name": file.file_name,
                    "level0": buckets.level0.len(),
                    "level1": buckets.level1.len(),
                    "level2": buckets.level2.len(),
                }))
            }
            AggregationAction::List => {
                let files: Vec<_> = ctl
                    .list_aggregation_files()
                    .await?
                    .into_iter()
                    .map(|f| {
                        json!({
                            "id": f.id,
                            "file_name": f.file_name,
                            "status": f.status,
                            "report_id": f.report_id,
                            "created_at": f.created_at,
                        })
                    })
                    .collect();
                print_json(&files)
            }
            AggregationAction::Show { id } => {
                let (file, buckets) = ctl.show_aggregation_file(id).await?;
                print_json(&json!({
                    "id": file.id,
                    "file_name": file.file_name,
                    "status": file.status,
                    "report_id": file.report_id,
                    "codes": buckets,
                }))
            }
            AggregationAction::Edit {
                id,
                file_name,
                status,
            } => {
                let file = ctl.edit_aggregation_file(id, &file_name, &status).await?;
                print_json(&json!({
                    "id": file.id,
                    "file_name": file.file_name,
                    "status": file.status,
                    "report_id": file.report_id,
                }))
            }
            AggregationAction::Delete { id } => {
                ctl.delete_aggregation_file(id).await?;
                print_json(&json!({ "deleted": id }))
            }
            AggregationAction::Report {
                id,
                target,
                participant_id,
                production_line_id,
                production_order_id,
            } => {
                let options = AggregationOptions {
                    participant_id,
                    production_line_id,
                    production_order_id,
                };
                print_json(
                    &ctl.send_aggregation_report(
                        id,
                        target.connection,
                        target.extension.as_deref(),
                        options,
                    )
                    .await?,
                )
            }
        },

        Commands::Api { action } => run_api(action, ctl).await,

        Commands::Logs { action } => match action {
            LogsAction::List { limit } => print_json(&ctl.api_logs(limit).await?),
            LogsAction::Clear => print_json(&json!({ "deleted": ctl.clear_api_logs().await? })),
        },
    }
}

async fn run_api(action: ApiAction, ctl: &Controller) -> Result<(), OmsError> {
    match action {
        ApiAction::Ping(t) => print_json(&ctl.ping(t.connection, t.extension.as_deref()).await?),
        ApiAction::Orders(t) => {
            match ctl.refresh_orders(t.connection, t.extension.as_deref()).await? {
                OrdersView::Fresh { summary, orders } => {
                    print_json(&json!({ "source": "server", "sync": summary, "orders": orders }))
                }
                OrdersView::Cached { reason, orders } => {
                    eprintln!("OMS unreachable ({reason}); showing cached orders");
                    print_json(&json!({ "source": "cache", "orders": orders }))
                }
            }
        }
        ApiAction::Buffer {
            target,
            order_id,
            gtin,
        } => print_json(
            &ctl.buffer_status(target.connection, target.extension.as_deref(), &order_id, &gtin)
                .await?,
        ),
        ApiAction::Codes {
            target,
            order_id,
            gtin,
            quantity,
        } => print_json(
            &ctl.fetch_codes(
                target.connection,
                target.extension.as_deref(),
                &order_id,
                &gtin,
                quantity,
            )
            .await?,
        ),
        ApiAction::Close {
            target,
            order_id,
            gtin,
        } => print_json(
            &ctl.close_buffer(target.connection, target.extension.as_deref(), &order_id, &gtin)
                .await?,
        ),
        ApiAction::Utilise {
            target,
            usage_type,
            order_id,
            mut codes,
            production_date,
            expiration_date,
            series_number,
        } => {
            if codes.is_empty()
                && let Some(order_id) = order_id.as_deref()
            {
                codes = ctl.unreported_codes(order_id).await?;
            }
            let options = UtilisationOptions {
                production_date,
                expiration_date,
                series_number,
            };
            print_json(
                &ctl.send_utilisation(
                    target.connection,
                    target.extension.as_deref(),
                    &codes,
                    &usage_type,
                    &options,
                )
                .await?,
            )
        }
        ApiAction::ReportStatus { target, report_id } => print_json(
            &ctl.report_status(target.connection, target.extension.as_deref(), &report_id)
                .await?,
        ),
    }
}
