mod sights;
