fn main() {
    adb_app_manager_lib::run()
}
