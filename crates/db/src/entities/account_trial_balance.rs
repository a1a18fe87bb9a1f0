//! `SeaORM` Entity for account_trial_balance table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "account_trial_balance")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub entity_code: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub sub_category_code: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub balance_date: Date,
    #[sea_orm(column_type = "Decimal(Some((20, 4)))")]
    pub opening_balance: Decimal,
    #[sea_orm(column_type = "Decimal(Some((20, 4)))")]
    pub debit_movement: Decimal,
    #[sea_orm(column_type = "Decimal(Some((20, 4)))")]
    pub credit_movement: Decimal,
    #[sea_orm(column_type = "Decimal(Some((20, 4)))")]
    pub closing_balance: Decimal,
    pub account_count: i64,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
