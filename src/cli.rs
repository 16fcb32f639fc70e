use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start feedrank as a service.
    Daemon {},

    /// Rank feed content for a user.
    Recommend {
        /// Email of the requesting user
        #[clap(short, long)]
        email: String,

        /// Maximum number of recommendations
        #[clap(short, long)]
        limit: Option<usize>,
    },

    /// Rebuild the vector index over post embeddings.
    RebuildIndex {
        /// Append posts created since the last build instead of
        /// rebuilding from scratch
        #[clap(long)]
        incremental: bool,
    },

    /// Show the persisted index state.
    IndexStatus {},

    /// Calculate and store interaction strength between two users.
    Interaction {
        /// Source user id
        #[clap(short, long)]
        source: String,

        /// Target user id
        #[clap(short, long)]
        target: String,

        /// Read the stored value instead of recalculating
        #[clap(long)]
        stored: bool,
    },

    /// List a user's connections with interaction strengths.
    Connections {
        /// User id
        user_id: String,
    },

    /// Show a post with annotated engagement.
    Post {
        /// Post id
        post_id: String,
    },
}
