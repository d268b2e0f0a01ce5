pub mod concurrent_hashmap;
