//! Repository for the `employees` table, including the capacity counters.

use agency_core::employee::{CreateEmployee, UpdateEmployee};
use agency_core::types::{DbId, Hours};
use sqlx::{PgConnection, PgPool};

use crate::models::employee::EmployeeRow;

/// Column list for `employees` queries.
const COLUMNS: &str = "id, user_id, employee_role, department, weekly_capacity, \
    current_workload, current_project_count, max_concurrent_projects, \
    available_for_work, skill_set, status, created_at, updated_at";

pub struct EmployeeRepo;

impl EmployeeRepo {
    /// Insert a new employee with an empty ledger.
    pub async fn create(pool: &PgPool, input: &CreateEmployee) -> Result<EmployeeRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO employees \
                (user_id, employee_role, department, weekly_capacity, \
                 max_concurrent_projects, available_for_work, skill_set) \
             VALUES ($1, $2, $3, $4, $5, COALESCE($6, true), $7) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, EmployeeRow>(&query)
            .bind(input.user_id)
            .bind(&input.employee_role)
            .bind(&input.department)
            .bind(input.weekly_capacity)
            .bind(input.max_concurrent_projects)
            .bind(input.available_for_work)
            .bind(&input.skill_set)
            .fetch_one(pool)
            .await
    }

    /// Update profile fields. Only non-`None` fields are applied; the
    /// capacity counters are never touched here.
    ///
    /// Returns `None` if no row with the given `id` exists.
    pub async fn update(
        pool: &PgPool,
        id: DbId,
        input: &UpdateEmployee,
    ) -> Result<Option<EmployeeRow>, sqlx::Error> {
        let query = format!(
            "UPDATE employees SET \
                employee_role = COALESCE($2, employee_role), \
                department = COALESCE($3, department), \
                weekly_capacity = COALESCE($4, weekly_capacity), \
                max_concurrent_projects = COALESCE($5, max_concurrent_projects), \
                available_for_work = COALESCE($6, available_for_work), \
                skill_set = COALESCE($7, skill_set), \
                status = COALESCE($8, status) \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, EmployeeRow>(&query)
            .bind(id)
            .bind(&input.employee_role)
            .bind(&input.department)
            .bind(input.weekly_capacity)
            .bind(input.max_concurrent_projects)
            .bind(input.available_for_work)
            .bind(&input.skill_set)
            .bind(input.status.map(|s| s.as_str()))
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<EmployeeRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM employees WHERE id = $1");
        sqlx::query_as::<_, EmployeeRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_user_id(
        pool: &PgPool,
        user_id: DbId,
    ) -> Result<Option<EmployeeRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM employees WHERE user_id = $1");
        sqlx::query_as::<_, EmployeeRow>(&query)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// List all employees ordered by id.
    pub async fn list(pool: &PgPool) -> Result<Vec<EmployeeRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM employees ORDER BY id");
        sqlx::query_as::<_, EmployeeRow>(&query).fetch_all(pool).await
    }

    /// List employees with `status = 'active'` ordered by id.
    pub async fn list_active(pool: &PgPool) -> Result<Vec<EmployeeRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM employees WHERE status = 'active' ORDER BY id");
        sqlx::query_as::<_, EmployeeRow>(&query).fetch_all(pool).await
    }

    /// Add reserved hours and, when `opens_project`, one project slot.
    pub async fn reserve(
        conn: &mut PgConnection,
        id: DbId,
        hours: Hours,
        opens_project: bool,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE employees SET \
                current_workload = current_workload + GREATEST($2, 0), \
                current_project_count = current_project_count + CASE WHEN $3 THEN 1 ELSE 0 END \
             WHERE id = $1",
        )
        .bind(id)
        .bind(hours)
        .bind(opens_project)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Return hours and, when `closes_project`, one project slot. Both
    /// counters floor at zero.
    pub async fn release(
        conn: &mut PgConnection,
        id: DbId,
        hours: Hours,
        closes_project: bool,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE employees SET \
                current_workload = GREATEST(current_workload - GREATEST($2, 0), 0), \
                current_project_count = GREATEST( \
                    current_project_count - CASE WHEN $3 THEN 1 ELSE 0 END, 0) \
             WHERE id = $1",
        )
        .bind(id)
        .bind(hours)
        .bind(closes_project)
        .execute(conn)
        .await?;
        Ok(())
    }
}
