pub mod assist; // Derived clinical state synchronization
pub mod llm; // Generation backend client
