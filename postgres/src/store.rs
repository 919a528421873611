//! PostgreSQL implementation of the admission and listing stores.

use crate::rows::{
    FlowSlotRow, INSTANCE_COLUMNS, InstanceRow, REGISTRATION_COLUMNS, RegistrationRow, to_i32,
};
use chrono::{DateTime, Utc};
use seatline_core::error::{RegistrationError, Result};
use seatline_core::page::Direction;
use seatline_core::store::{
    AdmissionStore, KeysetWindow, RegistrationFilter, RegistrationQuery, SeatUpdate,
};
use seatline_core::types::{
    FlowSlot, Instance, InstanceCode, NewRegistration, RegistrationId, RegistrationRecord,
    RegistrationStatus,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder, Transaction};

/// Map a driver error, turning serialization failures and deadlocks into
/// [`RegistrationError::WriteConflict`].
fn map_sqlx_error(context: &str, error: &sqlx::Error) -> RegistrationError {
    match error {
        // serialization_failure, deadlock_detected
        sqlx::Error::Database(db_err)
            if db_err
                .code()
                .is_some_and(|code| code == "40001" || code == "40P01") =>
        {
            RegistrationError::WriteConflict(format!("{context}: {db_err}"))
        }
        _ => RegistrationError::Internal(format!("{context}: {error}")),
    }
}

/// Escape `LIKE` metacharacters so the search term matches literally.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Append the `WHERE` clause shared by the window query and the count.
fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &RegistrationFilter) {
    builder
        .push(" WHERE instance_code = ")
        .push_bind(filter.instance_code.as_str().to_string());
    if let Some(status) = filter.status {
        builder.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(search) = filter.search.as_deref().filter(|s| !s.is_empty()) {
        builder
            .push(" AND registrant ILIKE ")
            .push_bind(format!("%{}%", escape_like(search)))
            .push(" ESCAPE '\\'");
    }
}

/// PostgreSQL-backed registration store.
///
/// Row locks come from `SELECT ... FOR UPDATE`; counter writes also check the
/// row version so a writer that skipped the lock cannot clobber another.
///
/// # Example
///
/// ```no_run
/// use seatline_postgres::PostgresRegistrationStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = PostgresRegistrationStore::connect("postgres://localhost/seatline", 10).await?;
/// store.migrate().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct PostgresRegistrationStore {
    pool: PgPool,
}

impl PostgresRegistrationStore {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a new pool.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the database cannot be reached.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("Failed to connect", &e))?;
        Ok(Self::new(pool))
    }

    /// Access the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if a migration fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| RegistrationError::Internal(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// Insert an instance and its flow slots.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the row violates a constraint or the code exists.
    pub async fn create_instance(&self, instance: &Instance) -> Result<()> {
        let mut tx = self.begin().await?;

        sqlx::query(
            "INSERT INTO instances
                (code, total_seats, booked_seats, scanned_seats, register_flow,
                 register_window_start, register_window_end, max_per_transaction, status, version)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(instance.code.as_str())
        .bind(to_i32(instance.total_seats, "total_seats")?)
        .bind(to_i32(instance.booked_seats, "booked_seats")?)
        .bind(to_i32(instance.scanned_seats, "scanned_seats")?)
        .bind(instance.register_flow.as_str())
        .bind(instance.register_window_start)
        .bind(instance.register_window_end)
        .bind(to_i32(instance.max_per_transaction, "max_per_transaction")?)
        .bind(instance.status.as_str())
        .bind(instance.version)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("Failed to insert instance", &e))?;

        for slot in &instance.flow_slots {
            sqlx::query(
                "INSERT INTO instance_flow_slots (instance_code, flow, capacity, used)
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(instance.code.as_str())
            .bind(slot.flow.as_str())
            .bind(to_i32(slot.capacity, "capacity")?)
            .bind(to_i32(slot.used, "used")?)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("Failed to insert flow slot", &e))?;
        }

        self.commit(tx).await?;
        tracing::info!(instance = %instance.code, "Instance created");
        Ok(())
    }

    /// Read a committed registration.
    ///
    /// # Errors
    ///
    /// Returns `Internal` on database failure.
    pub async fn registration(&self, id: RegistrationId) -> Result<Option<RegistrationRecord>> {
        sqlx::query_as::<_, RegistrationRow>(&format!(
            "SELECT {REGISTRATION_COLUMNS} FROM registrations WHERE id = $1"
        ))
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("Failed to read registration", &e))?
        .map(RegistrationRow::into_record)
        .transpose()
    }

    async fn read_instance(
        conn: &mut PgConnection,
        code: &InstanceCode,
        for_update: bool,
    ) -> Result<Option<Instance>> {
        let lock = if for_update { " FOR UPDATE" } else { "" };
        let Some(row) = sqlx::query_as::<_, InstanceRow>(&format!(
            "SELECT {INSTANCE_COLUMNS} FROM instances WHERE code = $1{lock}"
        ))
        .bind(code.as_str())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("Failed to read instance", &e))?
        else {
            return Ok(None);
        };

        let slots = sqlx::query_as::<_, FlowSlotRow>(
            "SELECT flow, capacity, used FROM instance_flow_slots
             WHERE instance_code = $1 ORDER BY flow",
        )
        .bind(code.as_str())
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("Failed to read flow slots", &e))?
        .into_iter()
        .map(FlowSlotRow::into_slot)
        .collect::<Result<Vec<FlowSlot>>>()?;

        row.into_instance(slots).map(Some)
    }
}

impl AdmissionStore for PostgresRegistrationStore {
    type Tx = Transaction<'static, Postgres>;

    async fn begin(&self) -> Result<Self::Tx> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("Failed to begin transaction", &e))
    }

    async fn commit(&self, tx: Self::Tx) -> Result<()> {
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("Failed to commit transaction", &e))
    }

    async fn rollback(&self, tx: Self::Tx) -> Result<()> {
        tx.rollback()
            .await
            .map_err(|e| map_sqlx_error("Failed to roll back transaction", &e))
    }

    async fn load_instance(&self, code: &InstanceCode) -> Result<Option<Instance>> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("Failed to acquire connection", &e))?;
        Self::read_instance(&mut *conn, code, false).await
    }

    async fn lock_instance(
        &self,
        tx: &mut Self::Tx,
        code: &InstanceCode,
    ) -> Result<Option<Instance>> {
        Self::read_instance(&mut **tx, code, true).await
    }

    #[tracing::instrument(level = "debug", skip(self, tx, update), fields(instance = %update.instance_code))]
    async fn write_seats(&self, tx: &mut Self::Tx, update: &SeatUpdate) -> Result<()> {
        let result = sqlx::query(
            "UPDATE instances
             SET booked_seats = $2, scanned_seats = $3, version = version + 1, updated_at = NOW()
             WHERE code = $1 AND version = $4",
        )
        .bind(update.instance_code.as_str())
        .bind(to_i32(update.counters.booked, "booked_seats")?)
        .bind(to_i32(update.counters.scanned, "scanned_seats")?)
        .bind(update.expected_version)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("Failed to write seat counters", &e))?;

        if result.rows_affected() == 0 {
            return Err(RegistrationError::WriteConflict(format!(
                "instance {} moved past version {}",
                update.instance_code, update.expected_version
            )));
        }

        if let Some((flow, used)) = update.flow_used {
            sqlx::query(
                "UPDATE instance_flow_slots SET used = $3
                 WHERE instance_code = $1 AND flow = $2",
            )
            .bind(update.instance_code.as_str())
            .bind(flow.as_str())
            .bind(to_i32(used, "used")?)
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("Failed to write flow slot", &e))?;
        }

        Ok(())
    }

    async fn insert_registration(
        &self,
        tx: &mut Self::Tx,
        registration: &NewRegistration,
    ) -> Result<RegistrationRecord> {
        let (id, registered_at): (i64, DateTime<Utc>) = sqlx::query_as(
            "INSERT INTO registrations
                (instance_code, registrant, quantity, flow, status, registered_at)
             VALUES ($1, $2, $3, $4, 'booked', $5)
             RETURNING id, registered_at",
        )
        .bind(registration.instance_code.as_str())
        .bind(&registration.registrant)
        .bind(to_i32(registration.quantity, "quantity")?)
        .bind(registration.flow.map(|flow| flow.as_str()))
        .bind(registration.registered_at)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("Failed to insert registration", &e))?;

        // The column keeps microseconds; return what a later read will see.
        let mut record = registration.clone().into_record(RegistrationId::new(id));
        record.registered_at = registered_at;
        Ok(record)
    }

    async fn lock_registration(
        &self,
        tx: &mut Self::Tx,
        id: RegistrationId,
    ) -> Result<Option<RegistrationRecord>> {
        sqlx::query_as::<_, RegistrationRow>(&format!(
            "SELECT {REGISTRATION_COLUMNS} FROM registrations WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.get())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("Failed to lock registration", &e))?
        .map(RegistrationRow::into_record)
        .transpose()
    }

    async fn update_registration_status(
        &self,
        tx: &mut Self::Tx,
        id: RegistrationId,
        status: RegistrationStatus,
        verified_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE registrations SET status = $2, verified_at = COALESCE($3, verified_at)
             WHERE id = $1",
        )
        .bind(id.get())
        .bind(status.as_str())
        .bind(verified_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("Failed to update registration", &e))?;

        if result.rows_affected() == 0 {
            return Err(RegistrationError::registration_not_found(id));
        }
        Ok(())
    }
}

impl RegistrationQuery for PostgresRegistrationStore {
    #[tracing::instrument(level = "debug", skip(self, filter, window), fields(instance = %filter.instance_code))]
    async fn fetch_window(
        &self,
        filter: &RegistrationFilter,
        window: &KeysetWindow,
    ) -> Result<Vec<RegistrationRecord>> {
        let mut builder =
            QueryBuilder::<Postgres>::new(format!("SELECT {REGISTRATION_COLUMNS} FROM registrations"));
        push_filter(&mut builder, filter);

        let (comparison, order) = match window.direction {
            Direction::Next => ("<", " ORDER BY registered_at DESC, id DESC"),
            Direction::Prev => (">", " ORDER BY registered_at ASC, id ASC"),
        };
        if let Some(after) = window.after {
            builder
                .push(format!(" AND (registered_at, id) {comparison} ("))
                .push_bind(after.timestamp)
                .push(", ")
                .push_bind(after.id.get())
                .push(")");
        }
        builder
            .push(order)
            .push(" LIMIT ")
            .push_bind(i64::from(window.fetch));

        builder
            .build_query_as::<RegistrationRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("Failed to fetch registrations", &e))?
            .into_iter()
            .map(RegistrationRow::into_record)
            .collect()
    }

    async fn count(&self, filter: &RegistrationFilter) -> Result<u64> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM registrations");
        push_filter(&mut builder, filter);

        let count = builder
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("Failed to count registrations", &e))?;
        u64::try_from(count)
            .map_err(|_| RegistrationError::Internal(format!("Negative count: {count}")))
    }
}
