use async_trait::async_trait;

use crate::{
    domain::{Ban, Channel, ChannelId, Member, MessageRef, Server, ServerId, User, UserId},
    Result,
};

/// Hexagonal port for the chat platform.
///
/// Every call may fail; failures are ordinary errors, never panics. Adapters own
/// timeouts: the core assumes a hung request eventually surfaces as an error.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// The bot's own account.
    fn current_user(&self) -> User;

    async fn send_message(&self, channel_id: ChannelId, text: &str) -> Result<MessageRef>;
    async fn edit_message(&self, msg: MessageRef, text: &str) -> Result<()>;
    async fn delete_message(&self, msg: MessageRef) -> Result<()>;

    async fn list_bans(&self, server_id: ServerId) -> Result<Vec<Ban>>;

    /// `Ok(None)` when the user is not a member of the server.
    async fn get_member(&self, server_id: ServerId, user_id: UserId) -> Result<Option<Member>>;

    async fn get_user(&self, user_id: UserId) -> Result<Option<User>>;

    /// All servers the bot currently belongs to.
    async fn list_servers(&self) -> Result<Vec<Server>>;
    async fn get_server(&self, server_id: ServerId) -> Result<Option<Server>>;
    async fn get_channel(&self, channel_id: ChannelId) -> Result<Option<Channel>>;

    /// Open (or reuse) the one-to-one channel with a user.
    async fn create_direct_channel(&self, user_id: UserId) -> Result<ChannelId>;
}
