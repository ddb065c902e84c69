//! Migration to create the client_channels table.
//!
//! A channel binds a WhatsApp phone number id to a client and stores the
//! AES-GCM encrypted access token and webhook signing secret.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ClientChannels::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ClientChannels::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ClientChannels::ClientId).uuid().not_null())
                    .col(ColumnDef::new(ClientChannels::PhoneNumberId).text().not_null())
                    .col(
                        ColumnDef::new(ClientChannels::AccessTokenCiphertext)
                            .binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ClientChannels::SigningSecretCiphertext)
                            .binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ClientChannels::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(ClientChannels::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ClientChannels::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_client_channels_client_id")
                            .from(ClientChannels::Table, ClientChannels::ClientId)
                            .to(Clients::Table, Clients::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Inbound deliveries are resolved by phone number id, active channels first
        manager
            .create_index(
                Index::create()
                    .name("idx_client_channels_phone_number_active")
                    .table(ClientChannels::Table)
                    .col(ClientChannels::PhoneNumberId)
                    .col(ClientChannels::IsActive)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_client_channels_phone_number_active")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(ClientChannels::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ClientChannels {
    Table,
    Id,
    ClientId,
    PhoneNumberId,
    AccessTokenCiphertext,
    SigningSecretCiphertext,
    IsActive,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Clients {
    Table,
    Id,
}
