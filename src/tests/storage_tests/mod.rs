// Storage Tests Module - Testing the storage module
// - message_store_tests: MessageStore replace/append/confirm semantics
// - conversation_index_tests: ConversationIndex ordering and unread handling
// - settings_tests: Settings defaults, validation and persistence

mod conversation_index_tests;
mod message_store_tests;
mod settings_tests;
