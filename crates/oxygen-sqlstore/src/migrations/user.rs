//! The `user` table and its unique indices.

use oxygen_migrator::prelude::*;

/// The first version of the `user` table.
#[must_use]
pub fn user_table_v1() -> Table {
    Table::new("user")
        .column(
            Column::new("id", ColumnType::BigInt)
                .primary_key()
                .auto_increment(),
        )
        .column(Column::new("version", ColumnType::Int))
        .column(Column::new("login", ColumnType::NVarchar).length(190))
        .column(Column::new("email", ColumnType::NVarchar).length(190))
        .column(Column::new("name", ColumnType::NVarchar).length(255).nullable())
        .column(Column::new("password", ColumnType::NVarchar).length(255).nullable())
        .column(Column::new("salt", ColumnType::NVarchar).length(50).nullable())
        .column(Column::new("rands", ColumnType::NVarchar).length(50).nullable())
        .column(Column::new("company", ColumnType::NVarchar).length(255).nullable())
        .column(Column::new("account_id", ColumnType::BigInt))
        .column(Column::new("is_admin", ColumnType::Bool))
        .column(Column::new("created", ColumnType::DateTime))
        .column(Column::new("updated", ColumnType::DateTime))
        .index(Index::unique(["login"]))
        .index(Index::unique(["email"]))
}

pub(super) fn add_user_migrations(mg: &mut Migrator) {
    let user = user_table_v1();

    mg.add_migration("create user table", Migration::add_table(user.clone()));
    mg.add_migration(
        "add unique index user.login",
        Migration::add_index(&user, user.indices[0].clone()),
    );
    mg.add_migration(
        "add unique index user.email",
        Migration::add_index(&user, user.indices[1].clone()),
    );
}
