pub mod locks;
pub mod supabase;

pub use locks::AdvisoryLocks;
pub use supabase::SupabaseClient;
