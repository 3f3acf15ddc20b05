fn main() {
    // Only the esp32 backend links against ESP-IDF
    if std::env::var_os("CARGO_FEATURE_ESP32").is_some() {
        embuild::espidf::sysenv::output();
    }
}
