pub mod token_counter;
