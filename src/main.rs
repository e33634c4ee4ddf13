fn main() {
    aio_hub_lib::run()
}
